//! Single dispatch point for project messages.
//!
//! Every routed message yields exactly one transcript entry. Assistant bodies
//! are decoded; when decoding fails the raw body is kept as an opaque entry and
//! the file tree is left alone.

use workspace_protocol::{ChannelMessage, ChannelSender, ASSISTANT_SENDER};

use crate::core::file_tree::{FileTreeStore, MergeReport};
use crate::core::payload::{raw_body_text, StructuredPayload};
use crate::core::transcript::{EntryAuthor, EntryBody, EntrySeq, TranscriptLog};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Human {
        seq: EntrySeq,
    },
    Assistant {
        seq: EntrySeq,
        merge: Option<MergeReport>,
    },
    Undecodable {
        seq: EntrySeq,
        error: String,
    },
}

impl RouteOutcome {
    pub fn seq(&self) -> EntrySeq {
        match self {
            Self::Human { seq } | Self::Assistant { seq, .. } | Self::Undecodable { seq, .. } => *seq,
        }
    }

    /// True when the message changed the file tree.
    pub fn merged_files(&self) -> bool {
        matches!(self, Self::Assistant { merge: Some(report), .. } if report.changed_count() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct MessageRouter {
    assistant_id: String,
}

impl MessageRouter {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
        }
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    pub fn is_assistant(&self, sender: &ChannelSender) -> bool {
        match sender {
            ChannelSender::Named(name) => name == ASSISTANT_SENDER || *name == self.assistant_id,
            ChannelSender::User(user) => user.id == self.assistant_id,
        }
    }

    pub fn route(
        &self,
        message: ChannelMessage,
        local_user_id: &str,
        transcript: &mut TranscriptLog,
        files: &mut FileTreeStore,
    ) -> RouteOutcome {
        if self.is_assistant(&message.sender) {
            return self.route_assistant(message, transcript, files);
        }

        let author = match message.sender {
            ChannelSender::User(user) if user.id == local_user_id => EntryAuthor::Local(user),
            ChannelSender::User(user) => EntryAuthor::Peer(user),
            ChannelSender::Named(name) => {
                EntryAuthor::Peer(workspace_protocol::UserRef::new(name.clone(), name))
            }
        };
        let seq = transcript.append(author, EntryBody::Text(raw_body_text(&message.message)));
        RouteOutcome::Human { seq }
    }

    fn route_assistant(
        &self,
        message: ChannelMessage,
        transcript: &mut TranscriptLog,
        files: &mut FileTreeStore,
    ) -> RouteOutcome {
        let payload = match StructuredPayload::decode(&message.message) {
            Ok(payload) => payload,
            Err(error) => {
                let error = error.to_string();
                tracing::warn!(error = %error, "assistant payload could not be decoded; keeping raw body");
                let seq = transcript.append(
                    EntryAuthor::Assistant,
                    EntryBody::Opaque {
                        raw: raw_body_text(&message.message),
                        error: error.clone(),
                    },
                );
                return RouteOutcome::Undecodable { seq, error };
            }
        };

        let merge = payload.file_tree.as_ref().map(|patch| files.merge(patch));
        if let Some(report) = &merge {
            tracing::info!(
                created = report.created.len(),
                updated = report.updated.len(),
                "merged assistant file tree"
            );
        }

        let changed_paths = merge
            .as_ref()
            .map(|report| report.touched().map(str::to_string).collect())
            .unwrap_or_default();
        let seq = transcript.append(
            EntryAuthor::Assistant,
            EntryBody::Assistant {
                text: payload.text,
                changed_paths,
            },
        );
        RouteOutcome::Assistant { seq, merge }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new("ai")
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use workspace_protocol::{ChannelMessage, ChannelSender, FileNode, FileTree, UserRef};

    use super::{MessageRouter, RouteOutcome};
    use crate::core::file_tree::FileTreeStore;
    use crate::core::transcript::{EntryAuthor, EntryBody, TranscriptLog};

    fn assistant(body: serde_json::Value) -> ChannelMessage {
        ChannelMessage {
            message: body,
            sender: ChannelSender::Named("assistant".to_string()),
        }
    }

    #[test]
    fn assistant_payload_appends_text_and_merges_tree() {
        let router = MessageRouter::default();
        let mut transcript = TranscriptLog::new();
        let mut files = FileTreeStore::new();
        files.set("keep.js", "old").expect("set");

        let outcome = router.route(
            assistant(json!(
                r#"{"text":"created file","fileTree":{"a.js":{"file":{"contents":"x=1"}}}}"#
            )),
            "u1",
            &mut transcript,
            &mut files,
        );

        assert!(outcome.merged_files());
        assert_eq!(
            transcript.last().map(|entry| entry.display_text()),
            Some("created file")
        );
        assert_eq!(files.get("a.js"), Some(&FileNode::new("x=1")));
        assert_eq!(files.get("keep.js"), Some(&FileNode::new("old")));
        assert_matches!(
            &transcript.last().expect("entry").body,
            EntryBody::Assistant { changed_paths, .. } if changed_paths == &vec!["a.js".to_string()]
        );
    }

    #[test]
    fn malformed_assistant_payload_yields_one_opaque_entry() {
        let router = MessageRouter::default();
        let mut transcript = TranscriptLog::new();
        let mut files = FileTreeStore::new();

        let outcome = router.route(assistant(json!("{not json")), "u1", &mut transcript, &mut files);

        assert_matches!(outcome, RouteOutcome::Undecodable { seq: 0, .. });
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.last().map(|entry| entry.display_text()), Some("{not json"));
        assert_eq!(files.tree(), &FileTree::new());
    }

    #[test]
    fn human_messages_are_not_decoded() {
        let router = MessageRouter::default();
        let mut transcript = TranscriptLog::new();
        let mut files = FileTreeStore::new();
        let body = r#"{"text":"looks like json","fileTree":{"x":{"file":{"contents":"y"}}}}"#;

        let outcome = router.route(
            ChannelMessage::text(UserRef::new("u2", "b@x.io"), body),
            "u1",
            &mut transcript,
            &mut files,
        );

        assert_eq!(outcome, RouteOutcome::Human { seq: 0 });
        assert!(files.get("x").is_none());
        let entry = transcript.last().expect("entry");
        assert_eq!(entry.author, EntryAuthor::Peer(UserRef::new("u2", "b@x.io")));
        assert_eq!(entry.display_text(), body);
    }

    #[test]
    fn recognises_configured_assistant_user() {
        let router = MessageRouter::new("ai");
        assert!(router.is_assistant(&ChannelSender::Named("assistant".to_string())));
        assert!(router.is_assistant(&ChannelSender::User(UserRef::new("ai", "AI"))));
        assert!(!router.is_assistant(&ChannelSender::User(UserRef::new("u1", "a@x.io"))));
    }

    #[test]
    fn own_messages_are_marked_local() {
        let router = MessageRouter::default();
        let mut transcript = TranscriptLog::new();
        let mut files = FileTreeStore::new();

        router.route(
            ChannelMessage::text(UserRef::new("u1", "a@x.io"), "hi"),
            "u1",
            &mut transcript,
            &mut files,
        );

        assert_matches!(transcript.last().map(|entry| &entry.author), Some(EntryAuthor::Local(_)));
    }

    #[test]
    fn entries_follow_arrival_order() {
        let router = MessageRouter::default();
        let mut transcript = TranscriptLog::new();
        let mut files = FileTreeStore::new();

        let first = router.route(
            ChannelMessage::text(UserRef::new("u2", "b@x.io"), "first"),
            "u1",
            &mut transcript,
            &mut files,
        );
        let second = router.route(assistant(json!("broken")), "u1", &mut transcript, &mut files);
        let third = router.route(assistant(json!({ "text": "third" })), "u1", &mut transcript, &mut files);

        assert!(first.seq() < second.seq());
        assert!(second.seq() < third.seq());
        assert_eq!(transcript.len(), 3);
    }
}
