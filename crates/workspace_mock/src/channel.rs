//! In-process real-time channel.
//!
//! A [`MockChannelHub`] holds one broadcast room per project. Every
//! [`MockChannel`] obtained from [`MockChannelHub::connect`] is one client
//! connection; messages it publishes reach every other connection in the room
//! but never itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use workspace_protocol::{
    ChannelError, ChannelMessage, ChannelSubscription, InboundEvent, ProjectId, RealtimeChannel,
};

use crate::lock_unpoisoned;

pub type ConnectionId = u64;

pub const DEFAULT_ROOM_CAPACITY: usize = 256;

/// Origin used for events injected by the hub itself.
const HUB_ORIGIN: ConnectionId = 0;

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    Join {
        connection: ConnectionId,
        project_id: ProjectId,
    },
    Publish {
        connection: ConnectionId,
        project_id: ProjectId,
        topic: String,
        message: ChannelMessage,
    },
    Leave {
        connection: ConnectionId,
        project_id: ProjectId,
    },
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: ConnectionId,
    event: InboundEvent,
}

#[derive(Debug, Default)]
struct HubState {
    rooms: HashMap<ProjectId, broadcast::Sender<Envelope>>,
    calls: Vec<ChannelCall>,
    failing_joins: usize,
    failing_publishes: bool,
}

#[derive(Debug)]
struct HubInner {
    state: Mutex<HubState>,
    next_connection: AtomicU64,
    capacity: usize,
}

#[derive(Debug, Clone)]
pub struct MockChannelHub {
    inner: Arc<HubInner>,
}

impl Default for MockChannelHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannelHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ROOM_CAPACITY)
    }

    /// Rooms buffer at most `capacity` events per slow subscriber; older events are lost.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState::default()),
                next_connection: AtomicU64::new(HUB_ORIGIN + 1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Opens a new client connection.
    #[must_use]
    pub fn connect(&self) -> MockChannel {
        MockChannel {
            id: self.inner.next_connection.fetch_add(1, Ordering::Relaxed),
            hub: self.clone(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Makes the next `count` join attempts fail.
    pub fn fail_next_joins(&self, count: usize) {
        lock_unpoisoned(&self.inner.state).failing_joins = count;
    }

    pub fn fail_publishes(&self, failing: bool) {
        lock_unpoisoned(&self.inner.state).failing_publishes = failing;
    }

    /// Ends every open subscription for `project_id`, as a transport drop would.
    pub fn drop_subscriptions(&self, project_id: &str) {
        let mut state = lock_unpoisoned(&self.inner.state);
        state.rooms.remove(project_id);
    }

    /// Delivers `payload` on `topic` to every connection in the room.
    /// Returns the number of subscribers reached.
    pub fn inject(&self, project_id: &str, topic: &str, payload: Value) -> usize {
        let sender = lock_unpoisoned(&self.inner.state).rooms.get(project_id).cloned();
        sender
            .and_then(|sender| {
                sender
                    .send(Envelope {
                        origin: HUB_ORIGIN,
                        event: InboundEvent::new(topic, payload),
                    })
                    .ok()
            })
            .unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self, project_id: &str) -> usize {
        lock_unpoisoned(&self.inner.state)
            .rooms
            .get(project_id)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    #[must_use]
    pub fn calls(&self) -> Vec<ChannelCall> {
        lock_unpoisoned(&self.inner.state).calls.clone()
    }

    fn record(&self, call: ChannelCall) {
        lock_unpoisoned(&self.inner.state).calls.push(call);
    }
}

/// One client connection to a [`MockChannelHub`].
#[derive(Debug)]
pub struct MockChannel {
    id: ConnectionId,
    hub: MockChannelHub,
    active: Mutex<HashMap<ProjectId, Vec<watch::Sender<bool>>>>,
}

impl MockChannel {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn subscribe(&self, project_id: &str) -> Result<broadcast::Receiver<Envelope>, ChannelError> {
        let mut state = lock_unpoisoned(&self.hub.inner.state);
        if state.failing_joins > 0 {
            state.failing_joins -= 1;
            return Err(ChannelError::new("join refused"));
        }

        let capacity = self.hub.inner.capacity;
        let sender = state
            .rooms
            .entry(project_id.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0);
        Ok(sender.subscribe())
    }
}

impl RealtimeChannel for MockChannel {
    fn join(&self, project_id: &str) -> BoxFuture<'static, Result<ChannelSubscription, ChannelError>> {
        self.hub.record(ChannelCall::Join {
            connection: self.id,
            project_id: project_id.to_string(),
        });

        let receiver = match self.subscribe(project_id) {
            Ok(receiver) => receiver,
            Err(error) => return future::ready(Err(error)).boxed(),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        lock_unpoisoned(&self.active)
            .entry(project_id.to_string())
            .or_default()
            .push(stop_tx);

        let events = stream::unfold(
            (receiver, stop_rx, self.id),
            |(mut receiver, mut stop, connection)| async move {
                loop {
                    tokio::select! {
                        biased;
                        changed = stop.changed() => {
                            if changed.is_err() || *stop.borrow() {
                                return None;
                            }
                        }
                        received = receiver.recv() => match received {
                            Ok(envelope) if envelope.origin == connection => {}
                            Ok(envelope) => {
                                return Some((envelope.event, (receiver, stop, connection)));
                            }
                            Err(RecvError::Lagged(_)) => {}
                            Err(RecvError::Closed) => return None,
                        }
                    }
                }
            },
        );

        future::ready(Ok(ChannelSubscription::new(events.boxed()))).boxed()
    }

    fn publish(
        &self,
        project_id: &str,
        topic: &str,
        message: ChannelMessage,
    ) -> BoxFuture<'static, Result<(), ChannelError>> {
        self.hub.record(ChannelCall::Publish {
            connection: self.id,
            project_id: project_id.to_string(),
            topic: topic.to_string(),
            message: message.clone(),
        });

        let state = lock_unpoisoned(&self.hub.inner.state);
        if state.failing_publishes {
            return future::ready(Err(ChannelError::new("publish rejected"))).boxed();
        }

        let payload = match serde_json::to_value(&message) {
            Ok(payload) => payload,
            Err(error) => return future::ready(Err(ChannelError::new(error.to_string()))).boxed(),
        };

        if let Some(sender) = state.rooms.get(project_id) {
            let _ = sender.send(Envelope {
                origin: self.id,
                event: InboundEvent::new(topic, payload),
            });
        }
        future::ready(Ok(())).boxed()
    }

    fn leave(&self, project_id: &str) {
        self.hub.record(ChannelCall::Leave {
            connection: self.id,
            project_id: project_id.to_string(),
        });

        if let Some(subscriptions) = lock_unpoisoned(&self.active).remove(project_id) {
            for stop in subscriptions {
                let _ = stop.send(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use workspace_protocol::{ChannelMessage, InboundEvent, RealtimeChannel, UserRef};

    use super::{ChannelCall, MockChannelHub};

    #[tokio::test]
    async fn publish_reaches_peers_but_not_sender() {
        let hub = MockChannelHub::new();
        let alice = hub.connect();
        let bob = hub.connect();

        let mut alice_events = alice.join("p1").await.expect("join").into_stream();
        let mut bob_events = bob.join("p1").await.expect("join").into_stream();

        let message = ChannelMessage::text(UserRef::new("a", "a@x.io"), "hi");
        alice
            .publish("p1", "project-message", message.clone())
            .await
            .expect("publish");
        hub.inject("p1", "presence", json!({}));

        let received = bob_events.next().await.expect("bob receives");
        assert_eq!(
            received,
            InboundEvent::new(
                "project-message",
                serde_json::to_value(&message).expect("encode")
            )
        );
        let first_for_alice = alice_events.next().await.expect("alice receives injected");
        assert_eq!(first_for_alice.topic, "presence");
    }

    #[tokio::test]
    async fn failing_joins_are_consumed_in_order() {
        let hub = MockChannelHub::new();
        let client = hub.connect();
        hub.fail_next_joins(1);

        assert!(client.join("p1").await.is_err());
        assert!(client.join("p1").await.is_ok());
        assert_eq!(hub.calls().len(), 2);
    }

    #[tokio::test]
    async fn leave_and_drop_end_subscriptions() {
        let hub = MockChannelHub::new();
        let client = hub.connect();

        let mut left = client.join("p1").await.expect("join").into_stream();
        client.leave("p1");
        assert!(left.next().await.is_none());

        let mut dropped = client.join("p1").await.expect("join").into_stream();
        hub.drop_subscriptions("p1");
        assert!(dropped.next().await.is_none());
        assert_eq!(hub.subscriber_count("p1"), 0);

        assert!(matches!(hub.calls()[1], ChannelCall::Leave { .. }));
    }
}
