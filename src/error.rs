use thiserror::Error;
use workspace_protocol::{ChannelError, ProjectId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("workspace has not been activated")]
    NotActive,

    #[error("workspace is already active for project {active}")]
    AlreadyActive { active: ProjectId },

    #[error("workspace session has ended")]
    Deactivated,

    #[error("failed to join channel for project {project_id}: {source}")]
    ChannelJoin {
        project_id: ProjectId,
        #[source]
        source: ChannelError,
    },

    #[error("no file at path '{path}'")]
    UnknownFile { path: String },

    #[error("file path must not be empty")]
    EmptyPath,

    #[error("project files have not been loaded yet")]
    ProjectNotLoaded,
}

impl WorkspaceError {
    /// Returns true for errors that leave the workspace unusable until the
    /// user intervenes.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::ChannelJoin { .. })
    }
}
