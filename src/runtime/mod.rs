//! Workspace orchestration: the channel, router and sandbox state machines,
//! the aggregate that owns them, and the tokio driver.

pub mod driver;
pub mod events;
pub mod gateway;
pub mod host;
pub mod router;
pub mod sandbox;
pub mod workspace;

pub use driver::{Backends, WorkspaceHandle, WorkspaceRuntime};
pub use events::{SandboxEvent, UserCommand, WorkspaceEvent};
pub use host::{GatewayHost, SandboxHost, StoreHost, WorkspaceHost};
