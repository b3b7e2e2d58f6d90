//! Project channel membership: join, publish, typed delivery and rejoin.
//!
//! Each join attempt is tagged with an epoch. Completions and deliveries from
//! an older epoch are ignored, so a dropped subscription can never feed the
//! workspace after its replacement was requested.
//!
//! Delivery is at-most-once: a publish that fails, or an event sent while the
//! subscription is down, is lost.

use std::time::Duration;

use workspace_protocol::{ChannelError, ChannelMessage, InboundEvent, ProjectId, PROJECT_MESSAGE_TOPIC};

use crate::error::WorkspaceError;
use crate::runtime::host::GatewayHost;

pub type JoinEpoch = u64;

/// Upper bound on the rejoin backoff exponent.
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Exponential backoff before rejoin attempt `attempt` (1-based).
pub fn rejoin_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    base.saturating_mul(2u32.saturating_pow(exponent))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejoinPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RejoinPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Inactive,
    Joining,
    Joined,
    Reconnecting { attempt: u32 },
    /// Rejoin attempts were exhausted or the initial join failed.
    Disconnected,
    Left,
}

/// Inbound channel traffic, decoded by topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    ProjectMessage(ChannelMessage),
}

#[derive(Debug)]
pub struct ChannelGateway {
    project_id: Option<ProjectId>,
    status: GatewayStatus,
    epoch: JoinEpoch,
    ever_joined: bool,
    policy: RejoinPolicy,
}

impl ChannelGateway {
    pub fn new(policy: RejoinPolicy) -> Self {
        Self {
            project_id: None,
            status: GatewayStatus::Inactive,
            epoch: 0,
            ever_joined: false,
            policy,
        }
    }

    pub fn status(&self) -> GatewayStatus {
        self.status
    }

    pub fn epoch(&self) -> JoinEpoch {
        self.epoch
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Joins the channel for `project_id`.
    ///
    /// Returns `Ok(false)` when already active for the same project, so a
    /// repeated activation never creates a second subscription.
    pub fn activate<H: GatewayHost + ?Sized>(
        &mut self,
        project_id: &str,
        host: &mut H,
    ) -> Result<bool, WorkspaceError> {
        match (&self.project_id, self.status) {
            (_, GatewayStatus::Left) => return Err(WorkspaceError::Deactivated),
            (Some(active), _) if active == project_id => {
                tracing::debug!(project_id, "channel already active; skipping join");
                return Ok(false);
            }
            (Some(active), _) => {
                return Err(WorkspaceError::AlreadyActive {
                    active: active.clone(),
                });
            }
            (None, _) => {}
        }

        self.project_id = Some(project_id.to_string());
        self.issue_join(GatewayStatus::Joining, Duration::ZERO, host);
        Ok(true)
    }

    /// Sends `message` on `topic` to the other members. No self-delivery.
    pub fn publish<H: GatewayHost + ?Sized>(
        &mut self,
        topic: &str,
        message: ChannelMessage,
        host: &mut H,
    ) -> Result<(), WorkspaceError> {
        let project_id = self.active_project()?;
        if self.status != GatewayStatus::Joined {
            tracing::warn!(
                project_id,
                status = ?self.status,
                "publishing while channel is not joined; message may be lost"
            );
        }
        host.publish(project_id, topic, message);
        Ok(())
    }

    /// User-initiated rejoin after the gateway gave up.
    pub fn reconnect<H: GatewayHost + ?Sized>(&mut self, host: &mut H) -> Result<(), WorkspaceError> {
        self.active_project()?;
        if self.status != GatewayStatus::Disconnected {
            return Ok(());
        }
        self.issue_join(GatewayStatus::Reconnecting { attempt: 1 }, Duration::ZERO, host);
        Ok(())
    }

    pub fn on_joined(&mut self, epoch: JoinEpoch) {
        if !self.is_current(epoch) {
            return;
        }

        tracing::info!(project_id = ?self.project_id, epoch, "channel joined");
        self.ever_joined = true;
        self.status = GatewayStatus::Joined;
    }

    /// Handles a failed join. Only a failure of the very first join is
    /// returned as a blocking error; later failures back off and retry.
    pub fn on_join_failed<H: GatewayHost + ?Sized>(
        &mut self,
        epoch: JoinEpoch,
        error: ChannelError,
        host: &mut H,
    ) -> Result<(), WorkspaceError> {
        if !self.is_current(epoch) {
            return Ok(());
        }

        if !self.ever_joined {
            tracing::warn!(project_id = ?self.project_id, error = %error, "initial channel join failed");
            self.status = GatewayStatus::Disconnected;
            return Err(WorkspaceError::ChannelJoin {
                project_id: self.project_id.clone().unwrap_or_default(),
                source: error,
            });
        }

        let attempt = match self.status {
            GatewayStatus::Reconnecting { attempt } => attempt + 1,
            _ => 1,
        };
        tracing::warn!(project_id = ?self.project_id, attempt, error = %error, "channel rejoin failed");
        self.schedule_rejoin(attempt, host);
        Ok(())
    }

    /// Handles a transport drop by rejoining the same project scope.
    pub fn on_dropped<H: GatewayHost + ?Sized>(&mut self, epoch: JoinEpoch, reason: &str, host: &mut H) {
        if !self.is_current(epoch) {
            return;
        }

        tracing::warn!(project_id = ?self.project_id, reason, "channel subscription dropped");
        self.schedule_rejoin(1, host);
    }

    /// Filters and decodes one inbound event.
    pub fn accept(&self, epoch: JoinEpoch, event: InboundEvent) -> Option<Delivery> {
        if !self.is_current(epoch) {
            tracing::debug!(epoch, current = self.epoch, "dropping event from stale subscription");
            return None;
        }

        if event.topic != PROJECT_MESSAGE_TOPIC {
            tracing::debug!(topic = %event.topic, "ignoring event on unhandled topic");
            return None;
        }

        match serde_json::from_value::<ChannelMessage>(event.payload) {
            Ok(message) => Some(Delivery::ProjectMessage(message)),
            Err(error) => {
                tracing::warn!(error = %error, "dropping malformed channel envelope");
                None
            }
        }
    }

    /// Leaves the channel. All later completions become stale.
    pub fn deactivate<H: GatewayHost + ?Sized>(&mut self, host: &mut H) {
        if let Some(project_id) = self.project_id.as_deref() {
            if self.status != GatewayStatus::Left {
                host.leave_channel(project_id);
            }
        }
        self.epoch += 1;
        self.status = GatewayStatus::Left;
    }

    fn schedule_rejoin<H: GatewayHost + ?Sized>(&mut self, attempt: u32, host: &mut H) {
        if attempt > self.policy.max_attempts {
            tracing::warn!(project_id = ?self.project_id, "channel rejoin attempts exhausted");
            self.status = GatewayStatus::Disconnected;
            return;
        }

        let delay = rejoin_delay(self.policy.base_delay, attempt);
        self.issue_join(GatewayStatus::Reconnecting { attempt }, delay, host);
    }

    fn issue_join<H: GatewayHost + ?Sized>(
        &mut self,
        status: GatewayStatus,
        delay: Duration,
        host: &mut H,
    ) {
        let Some(project_id) = self.project_id.as_deref() else {
            return;
        };

        self.epoch += 1;
        self.status = status;
        host.join_channel(project_id, self.epoch, delay);
    }

    fn active_project(&self) -> Result<&str, WorkspaceError> {
        match (self.project_id.as_deref(), self.status) {
            (_, GatewayStatus::Left) => Err(WorkspaceError::Deactivated),
            (Some(project_id), _) => Ok(project_id),
            (None, _) => Err(WorkspaceError::NotActive),
        }
    }

    fn is_current(&self, epoch: JoinEpoch) -> bool {
        epoch == self.epoch && self.status != GatewayStatus::Left
    }
}
