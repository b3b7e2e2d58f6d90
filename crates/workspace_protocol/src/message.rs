use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::project::UserId;

/// Topic every project chat message is published on.
pub const PROJECT_MESSAGE_TOPIC: &str = "project-message";

/// Literal sender name reserved for the automated assistant.
pub const ASSISTANT_SENDER: &str = "assistant";

/// Public identity of a workspace user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "_id", alias = "id")]
    pub id: UserId,
    #[serde(default)]
    pub email: String,
}

impl UserRef {
    #[must_use]
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Sender field of a channel message.
///
/// Humans are sent as user objects. The assistant may appear either as the
/// literal [`ASSISTANT_SENDER`] name or as a user object carrying a reserved id;
/// classification is left to the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelSender {
    Named(String),
    User(UserRef),
}

impl ChannelSender {
    /// Returns the sender id, or the literal name for named senders.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::User(user) => &user.id,
        }
    }
}

/// Envelope published on [`PROJECT_MESSAGE_TOPIC`].
///
/// `message` is a plain string for humans. For the assistant it is a JSON
/// document encoded as a string, or occasionally the document itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub message: Value,
    pub sender: ChannelSender,
}

impl ChannelMessage {
    /// Builds a plain-text message from a human sender.
    #[must_use]
    pub fn text(sender: UserRef, text: impl Into<String>) -> Self {
        Self {
            message: Value::String(text.into()),
            sender: ChannelSender::User(sender),
        }
    }

    /// Builds an assistant message whose body is an encoded payload document.
    #[must_use]
    pub fn assistant(encoded_payload: impl Into<String>) -> Self {
        Self {
            message: Value::String(encoded_payload.into()),
            sender: ChannelSender::Named(ASSISTANT_SENDER.to_string()),
        }
    }
}

/// One raw event delivered by a channel subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub topic: String,
    pub payload: Value,
}

impl InboundEvent {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}
