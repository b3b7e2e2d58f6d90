#![allow(dead_code)]

use std::time::Duration;

use collab_workspace::workspace_protocol::{
    ChannelMessage, CommandSpec, FileTree, ProcessId, ProjectRecord, UserId, UserRef,
};
use collab_workspace::{
    GatewayHost, JoinEpoch, ProcessRole, RunId, SandboxHost, SessionContext, StoreHost, Workspace,
    WorkspaceConfig, WorkspaceEvent, WorkspaceHost,
};

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Join {
        project_id: String,
        epoch: JoinEpoch,
        delay: Duration,
    },
    Leave(String),
    Publish {
        topic: String,
        message: ChannelMessage,
    },
    LoadProject(String),
    LoadUsers,
    Persist {
        generation: u64,
        paths: Vec<String>,
    },
    AddUsers(Vec<UserId>),
    Mount {
        run_id: RunId,
        paths: Vec<String>,
    },
    Spawn {
        run_id: RunId,
        role: ProcessRole,
        command: String,
    },
    Kill(ProcessId),
    TeardownSandbox,
}

/// Records every host request in order.
#[derive(Debug, Default)]
pub struct HostSpy {
    pub calls: Vec<HostCall>,
    pub renders: usize,
}

impl HostSpy {
    pub fn take(&mut self) -> Vec<HostCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn persists(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, HostCall::Persist { .. }))
            .count()
    }
}

impl GatewayHost for HostSpy {
    fn join_channel(&mut self, project_id: &str, epoch: JoinEpoch, delay: Duration) {
        self.calls.push(HostCall::Join {
            project_id: project_id.to_string(),
            epoch,
            delay,
        });
    }

    fn leave_channel(&mut self, project_id: &str) {
        self.calls.push(HostCall::Leave(project_id.to_string()));
    }

    fn publish(&mut self, _project_id: &str, topic: &str, message: ChannelMessage) {
        self.calls.push(HostCall::Publish {
            topic: topic.to_string(),
            message,
        });
    }
}

impl StoreHost for HostSpy {
    fn load_project(&mut self, project_id: &str) {
        self.calls.push(HostCall::LoadProject(project_id.to_string()));
    }

    fn load_users(&mut self) {
        self.calls.push(HostCall::LoadUsers);
    }

    fn persist_file_tree(&mut self, _project_id: &str, generation: u64, tree: FileTree) {
        self.calls.push(HostCall::Persist {
            generation,
            paths: tree.paths().map(str::to_string).collect(),
        });
    }

    fn add_users(&mut self, _project_id: &str, users: Vec<UserId>) {
        self.calls.push(HostCall::AddUsers(users));
    }
}

impl SandboxHost for HostSpy {
    fn mount(&mut self, run_id: RunId, tree: FileTree) {
        self.calls.push(HostCall::Mount {
            run_id,
            paths: tree.paths().map(str::to_string).collect(),
        });
    }

    fn spawn(&mut self, run_id: RunId, role: ProcessRole, command: CommandSpec) {
        self.calls.push(HostCall::Spawn {
            run_id,
            role,
            command: command.to_string(),
        });
    }

    fn kill(&mut self, process_id: ProcessId) {
        self.calls.push(HostCall::Kill(process_id));
    }

    fn teardown_sandbox(&mut self) {
        self.calls.push(HostCall::TeardownSandbox);
    }
}

impl WorkspaceHost for HostSpy {
    fn request_render(&mut self) {
        self.renders += 1;
    }
}

pub fn local_user() -> UserRef {
    UserRef::new("u1", "alice@example.com")
}

/// A workspace for project `p1` that has joined its channel.
pub fn joined_workspace(host: &mut HostSpy) -> Workspace {
    joined_workspace_with(WorkspaceConfig::default(), host)
}

pub fn joined_workspace_with(config: WorkspaceConfig, host: &mut HostSpy) -> Workspace {
    let mut workspace = Workspace::new(SessionContext::new("p1", local_user()), &config);
    workspace.activate(host).expect("activate");
    let epoch = workspace.gateway().epoch();
    workspace
        .apply(WorkspaceEvent::ChannelJoined { epoch }, host)
        .expect("joined");
    host.take();
    workspace
}

/// A joined workspace whose project `p1` has loaded with an empty tree.
pub fn loaded_workspace(host: &mut HostSpy) -> Workspace {
    let mut workspace = joined_workspace(host);
    workspace
        .apply(
            WorkspaceEvent::ProjectLoaded(ProjectRecord {
                id: "p1".to_string(),
                name: "demo".to_string(),
                users: Vec::new(),
                file_tree: FileTree::new(),
            }),
            host,
        )
        .expect("load");
    host.take();
    workspace
}
