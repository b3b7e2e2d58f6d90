use workspace_protocol::{
    ChannelError, InboundEvent, ProcessId, ProjectRecord, SandboxError, ServerReady, StoreError,
    UserId, UserRef,
};

use crate::runtime::gateway::JoinEpoch;
use crate::runtime::sandbox::{ProcessRole, RunId};

/// Completion or notification delivered to [`Workspace::apply`](crate::Workspace::apply).
#[derive(Debug, Clone, PartialEq)]
pub enum WorkspaceEvent {
    ChannelJoined {
        epoch: JoinEpoch,
    },
    ChannelJoinFailed {
        epoch: JoinEpoch,
        error: ChannelError,
    },
    ChannelDelivered {
        epoch: JoinEpoch,
        event: InboundEvent,
    },
    ChannelDropped {
        epoch: JoinEpoch,
        reason: String,
    },
    PublishFailed {
        error: ChannelError,
    },
    ProjectLoaded(ProjectRecord),
    ProjectLoadFailed(StoreError),
    UsersLoaded(Vec<UserRef>),
    UsersLoadFailed(StoreError),
    FileTreePersisted {
        generation: u64,
    },
    FileTreePersistFailed {
        generation: u64,
        error: StoreError,
    },
    CollaboratorsAdded,
    CollaboratorsAddFailed(StoreError),
    Sandbox(SandboxEvent),
    User(UserCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxEvent {
    Mounted {
        run_id: RunId,
    },
    MountFailed {
        run_id: RunId,
        error: SandboxError,
    },
    ProcessSpawned {
        run_id: RunId,
        role: ProcessRole,
        process_id: ProcessId,
    },
    SpawnFailed {
        run_id: RunId,
        role: ProcessRole,
        error: SandboxError,
    },
    ProcessOutput {
        run_id: RunId,
        role: ProcessRole,
        chunk: String,
    },
    ProcessExited {
        run_id: RunId,
        role: ProcessRole,
        process_id: ProcessId,
        code: i32,
    },
    ServerReady(ServerReady),
}

impl From<SandboxEvent> for WorkspaceEvent {
    fn from(event: SandboxEvent) -> Self {
        Self::Sandbox(event)
    }
}

/// Input originating from the person using this workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    SendMessage(String),
    EditFile { path: String, contents: String },
    OpenFile(String),
    CloseFile(String),
    RemoveFile(String),
    Run,
    ToggleCollaborator(UserId),
    CommitCollaborators,
    CancelCollaborators,
    Reconnect,
    Deactivate,
}

impl From<UserCommand> for WorkspaceEvent {
    fn from(command: UserCommand) -> Self {
        Self::User(command)
    }
}
