//! Headless front end for a collaborative project workspace.
//!
//! ## Environment
//!
//! - `COLLAB_PROJECT_ID` (default `demo`) and `COLLAB_USER_ID` /
//!   `COLLAB_USER_EMAIL` identify the session.
//! - `COLLAB_API_BASE_URL` selects the HTTP project store; `COLLAB_API_TOKEN`
//!   is sent as a bearer token. Without a base URL a seeded in-memory store is
//!   used.
//! - `COLLAB_LOG_FILE` redirects logs from stderr to a file; `RUST_LOG`
//!   filters them.
//! - Workspace tuning (`COLLAB_ASSISTANT_ID`, `COLLAB_START_COMMAND`, ...) is
//!   read by [`collab_workspace::WorkspaceConfig::from_env`].
//!
//! The realtime channel and the sandbox are the in-process implementations
//! from `workspace_mock`.

pub mod backends;
pub mod commands;
pub mod render;
