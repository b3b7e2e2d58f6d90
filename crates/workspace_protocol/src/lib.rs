//! Backend-neutral contract between the collaborative workspace core and the
//! services it consumes.
//!
//! This crate defines only wire types and the three consumed interfaces: the
//! real-time channel, the sandboxed runtime, and the project store. It carries
//! no transport, process or storage logic of its own.
//!
//! All interface methods are fire-and-forget from the caller's point of view:
//! they return boxed `'static` futures so a driver can hand them to an executor
//! and report completion back as an event.

pub mod channel;
pub mod message;
pub mod project;
pub mod sandbox;
pub mod store;
pub mod tree;

pub use channel::{ChannelError, ChannelSubscription, RealtimeChannel};
pub use message::{
    ChannelMessage, ChannelSender, InboundEvent, UserRef, ASSISTANT_SENDER, PROJECT_MESSAGE_TOPIC,
};
pub use project::{ProjectId, ProjectMember, ProjectRecord, UserId};
pub use sandbox::{
    CommandSpec, ProcessHandle, ProcessId, SandboxError, SandboxRuntime, ServerReady,
    SpawnedProcess,
};
pub use store::{ProjectStore, StoreError};
pub use tree::{FileNode, FileTree};
