//! In-memory project store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::{self, BoxFuture, FutureExt};
use workspace_protocol::{
    FileTree, ProjectId, ProjectMember, ProjectRecord, ProjectStore, StoreError, UserId, UserRef,
};

use crate::lock_unpoisoned;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetProject(ProjectId),
    UpdateFileTree { project_id: ProjectId, paths: Vec<String> },
    AddUsers { project_id: ProjectId, users: Vec<UserId> },
    ListUsers,
}

#[derive(Debug, Default)]
struct StoreState {
    projects: HashMap<ProjectId, ProjectRecord>,
    users: Vec<UserRef>,
    calls: Vec<StoreCall>,
    failing_updates: bool,
    failing_add_users: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockProjectStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockProjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, record: ProjectRecord) {
        lock_unpoisoned(&self.state)
            .projects
            .insert(record.id.clone(), record);
    }

    pub fn set_users(&self, users: Vec<UserRef>) {
        lock_unpoisoned(&self.state).users = users;
    }

    pub fn fail_updates(&self, failing: bool) {
        lock_unpoisoned(&self.state).failing_updates = failing;
    }

    pub fn fail_add_users(&self, failing: bool) {
        lock_unpoisoned(&self.state).failing_add_users = failing;
    }

    #[must_use]
    pub fn project(&self, project_id: &str) -> Option<ProjectRecord> {
        lock_unpoisoned(&self.state).projects.get(project_id).cloned()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        lock_unpoisoned(&self.state).calls.clone()
    }
}

fn not_found(project_id: &str) -> StoreError {
    StoreError::new(format!("project {project_id} not found"))
}

impl ProjectStore for MockProjectStore {
    fn get_project(&self, project_id: &str) -> BoxFuture<'static, Result<ProjectRecord, StoreError>> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(StoreCall::GetProject(project_id.to_string()));
        let result = state
            .projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| not_found(project_id));
        future::ready(result).boxed()
    }

    fn update_file_tree(
        &self,
        project_id: &str,
        file_tree: FileTree,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(StoreCall::UpdateFileTree {
            project_id: project_id.to_string(),
            paths: file_tree.paths().map(str::to_string).collect(),
        });

        if state.failing_updates {
            return future::ready(Err(StoreError::new("file tree update rejected"))).boxed();
        }

        let result = match state.projects.get_mut(project_id) {
            Some(record) => {
                record.file_tree = file_tree;
                Ok(())
            }
            None => Err(not_found(project_id)),
        };
        future::ready(result).boxed()
    }

    fn add_users(
        &self,
        project_id: &str,
        users: Vec<UserId>,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(StoreCall::AddUsers {
            project_id: project_id.to_string(),
            users: users.clone(),
        });

        if state.failing_add_users {
            return future::ready(Err(StoreError::new("add users rejected"))).boxed();
        }

        let result = match state.projects.get_mut(project_id) {
            Some(record) => {
                for user in users {
                    if !record.users.iter().any(|member| member.id() == user) {
                        record.users.push(ProjectMember::Id(user));
                    }
                }
                Ok(())
            }
            None => Err(not_found(project_id)),
        };
        future::ready(result).boxed()
    }

    fn list_users(&self) -> BoxFuture<'static, Result<Vec<UserRef>, StoreError>> {
        let mut state = lock_unpoisoned(&self.state);
        state.calls.push(StoreCall::ListUsers);
        future::ready(Ok(state.users.clone())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use workspace_protocol::{FileNode, FileTree, ProjectMember, ProjectRecord, ProjectStore};

    use super::{MockProjectStore, StoreCall};

    fn record() -> ProjectRecord {
        ProjectRecord {
            id: "p1".to_string(),
            name: "demo".to_string(),
            users: vec![ProjectMember::Id("u1".to_string())],
            file_tree: FileTree::new(),
        }
    }

    #[tokio::test]
    async fn updates_and_member_additions_are_applied() {
        let store = MockProjectStore::new();
        store.insert_project(record());

        let tree: FileTree = [("a.js".to_string(), FileNode::new("x"))].into_iter().collect();
        store.update_file_tree("p1", tree.clone()).await.expect("update");
        store
            .add_users("p1", vec!["u1".to_string(), "u2".to_string()])
            .await
            .expect("add users");

        let stored = store.project("p1").expect("project");
        assert_eq!(stored.file_tree, tree);
        let ids: Vec<&str> = stored.users.iter().map(ProjectMember::id).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
    }

    #[tokio::test]
    async fn missing_project_and_scripted_failures_error() {
        let store = MockProjectStore::new();
        assert!(store.get_project("nope").await.is_err());

        store.insert_project(record());
        store.fail_updates(true);
        assert!(store.update_file_tree("p1", FileTree::new()).await.is_err());
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::GetProject("nope".to_string()),
                StoreCall::UpdateFileTree {
                    project_id: "p1".to_string(),
                    paths: Vec::new()
                },
            ]
        );
    }
}
