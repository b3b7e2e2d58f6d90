use serde::{Deserialize, Serialize};

use crate::message::UserRef;
use crate::tree::FileTree;

pub type ProjectId = String;
pub type UserId = String;

/// Project member entry as returned by the store.
///
/// Depending on how the store populated the record, members arrive either as
/// bare ids or as full user objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectMember {
    Id(UserId),
    User(UserRef),
}

impl ProjectMember {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::User(user) => &user.id,
        }
    }

    #[must_use]
    pub fn as_user(&self) -> Option<&UserRef> {
        match self {
            Self::Id(_) => None,
            Self::User(user) => Some(user),
        }
    }
}

/// Project document returned by `GET /projects/get-project/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: ProjectId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub users: Vec<ProjectMember>,
    #[serde(default, rename = "fileTree")]
    pub file_tree: FileTree,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ProjectMember, ProjectRecord};

    #[test]
    fn decodes_populated_and_unpopulated_members() {
        let record: ProjectRecord = serde_json::from_value(json!({
            "_id": "p1",
            "name": "demo",
            "users": ["u1", { "_id": "u2", "email": "b@x.io" }],
            "fileTree": { "a.js": { "file": { "contents": "x" } } }
        }))
        .expect("record should decode");

        let ids: Vec<&str> = record.users.iter().map(ProjectMember::id).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
        assert_eq!(record.users[1].as_user().map(|user| user.email.as_str()), Some("b@x.io"));
        assert!(record.file_tree.contains("a.js"));
    }

    #[test]
    fn missing_file_tree_defaults_to_empty() {
        let record: ProjectRecord =
            serde_json::from_value(json!({ "_id": "p1", "name": "demo" })).expect("decode");
        assert!(record.file_tree.is_empty());
        assert!(record.users.is_empty());
    }
}
