//! Side-effect seam between the workspace state machines and the outside world.
//!
//! Every method is fire-and-forget: the host starts the operation and later
//! reports its completion as a [`WorkspaceEvent`](crate::runtime::events::WorkspaceEvent).

use std::time::Duration;

use workspace_protocol::{ChannelMessage, CommandSpec, FileTree, ProcessId, UserId};

use crate::runtime::gateway::JoinEpoch;
use crate::runtime::sandbox::{ProcessRole, RunId};

pub trait GatewayHost {
    /// Joins the project channel after `delay`; completion carries `epoch`.
    fn join_channel(&mut self, project_id: &str, epoch: JoinEpoch, delay: Duration);
    fn leave_channel(&mut self, project_id: &str);
    fn publish(&mut self, project_id: &str, topic: &str, message: ChannelMessage);
}

pub trait StoreHost {
    fn load_project(&mut self, project_id: &str);
    fn load_users(&mut self);
    fn persist_file_tree(&mut self, project_id: &str, generation: u64, tree: FileTree);
    fn add_users(&mut self, project_id: &str, users: Vec<UserId>);
}

pub trait SandboxHost {
    fn mount(&mut self, run_id: RunId, tree: FileTree);
    fn spawn(&mut self, run_id: RunId, role: ProcessRole, command: CommandSpec);
    fn kill(&mut self, process_id: ProcessId);
    fn teardown_sandbox(&mut self);
}

pub trait WorkspaceHost: GatewayHost + StoreHost + SandboxHost {
    /// Signals that observable workspace state changed.
    fn request_render(&mut self) {}
}
