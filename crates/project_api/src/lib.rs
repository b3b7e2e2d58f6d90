//! HTTP client for the project persistence API.
//!
//! Owns request building and response parsing for the four project/user
//! endpoints and exposes them through [`workspace_protocol::ProjectStore`].
//! No realtime or sandbox concerns live here.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod url;

pub use client::ProjectApiClient;
pub use config::ProjectApiConfig;
pub use error::ProjectApiError;
pub use url::endpoint;
