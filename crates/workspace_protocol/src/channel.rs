use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::message::{ChannelMessage, InboundEvent};

/// Transport-level channel failure (join, publish or drop).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ChannelError {
    message: String,
}

impl ChannelError {
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

/// Live membership of one project-scoped channel.
///
/// Events are yielded in the order the transport produced them. The stream
/// ending means the transport dropped the subscription.
pub struct ChannelSubscription {
    events: BoxStream<'static, InboundEvent>,
}

impl ChannelSubscription {
    #[must_use]
    pub fn new(events: BoxStream<'static, InboundEvent>) -> Self {
        Self { events }
    }

    #[must_use]
    pub fn into_stream(self) -> BoxStream<'static, InboundEvent> {
        self.events
    }
}

impl std::fmt::Debug for ChannelSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSubscription").finish_non_exhaustive()
    }
}

/// Publish/subscribe transport scoped by project id.
///
/// Delivery is at-most-once. Publishers do not receive their own messages.
pub trait RealtimeChannel: Send + Sync + 'static {
    /// Joins the channel for `project_id` and returns its inbound event stream.
    fn join(&self, project_id: &str) -> BoxFuture<'static, Result<ChannelSubscription, ChannelError>>;

    /// Sends `message` on `topic` to the other members of `project_id`.
    fn publish(
        &self,
        project_id: &str,
        topic: &str,
        message: ChannelMessage,
    ) -> BoxFuture<'static, Result<(), ChannelError>>;

    /// Leaves the channel for `project_id`; open subscriptions end.
    fn leave(&self, project_id: &str);
}
