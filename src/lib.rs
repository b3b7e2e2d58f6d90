//! Coordination core of a real-time collaborative project workspace.
//!
//! Several people and an assistant share one project: a chat channel, a
//! virtual file tree and a sandboxed runtime that builds and previews it.
//!
//! # Public API Overview
//! - [`Workspace`] owns the state of one activation and applies
//!   [`WorkspaceEvent`]s one at a time. It never performs I/O; side effects are
//!   requested through a [`WorkspaceHost`].
//! - [`WorkspaceRuntime`] drives a workspace on tokio against the services in
//!   [`workspace_protocol`].
//! - The components ([`FileTreeStore`], [`TranscriptLog`], [`MessageRouter`],
//!   [`ChannelGateway`], [`SandboxController`], [`CollaboratorSelector`]) are
//!   usable on their own.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod runtime;

pub use crate::config::WorkspaceConfig;
pub use crate::error::WorkspaceError;

pub use crate::core::file_tree::{merge_overwrite, FileTreeStore, MergeReport, SyncState};
pub use crate::core::payload::{PayloadError, StructuredPayload};
pub use crate::core::selection::{CollaboratorSelector, CommitOutcome, EmptyCommitPolicy};
pub use crate::core::transcript::{EntryAuthor, EntryBody, EntrySeq, TranscriptEntry, TranscriptLog};

pub use crate::runtime::driver::{Backends, WorkspaceHandle, WorkspaceRuntime};
pub use crate::runtime::events::{SandboxEvent, UserCommand, WorkspaceEvent};
pub use crate::runtime::gateway::{
    rejoin_delay, ChannelGateway, Delivery, GatewayStatus, JoinEpoch, RejoinPolicy,
};
pub use crate::runtime::host::{GatewayHost, SandboxHost, StoreHost, WorkspaceHost};
pub use crate::runtime::router::{MessageRouter, RouteOutcome};
pub use crate::runtime::sandbox::{
    OutputLine, ProcessRole, RunId, SandboxCommands, SandboxController, SandboxState,
    SandboxTransition,
};
pub use crate::runtime::workspace::{Lifecycle, Project, SessionContext, Workspace};

pub use workspace_protocol;
