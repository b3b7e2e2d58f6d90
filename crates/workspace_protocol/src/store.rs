use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::message::UserRef;
use crate::project::{ProjectRecord, UserId};
use crate::tree::FileTree;

/// Persistence request failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Request/response persistence service for projects and users.
pub trait ProjectStore: Send + Sync + 'static {
    fn get_project(&self, project_id: &str) -> BoxFuture<'static, Result<ProjectRecord, StoreError>>;

    /// Replaces the stored file tree of `project_id`.
    fn update_file_tree(
        &self,
        project_id: &str,
        file_tree: FileTree,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    /// Adds `users` to the member list of `project_id` in one batch.
    fn add_users(
        &self,
        project_id: &str,
        users: Vec<UserId>,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    fn list_users(&self) -> BoxFuture<'static, Result<Vec<UserRef>, StoreError>>;
}
