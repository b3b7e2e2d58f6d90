//! Pending collaborator selection.

use std::collections::BTreeSet;

use workspace_protocol::UserId;

/// What to do when the user commits an empty selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyCommitPolicy {
    /// Issue the add request with an empty user list.
    #[default]
    Send,
    /// Treat the commit as a local no-op.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The batch to send to the store. The selection stays until acknowledged.
    Send(Vec<UserId>),
    Skipped,
    /// A previous batch has not been acknowledged yet.
    AlreadyPending,
}

#[derive(Debug, Clone, Default)]
pub struct CollaboratorSelector {
    selected: BTreeSet<UserId>,
    in_flight: Option<Vec<UserId>>,
    empty_policy: EmptyCommitPolicy,
}

impl CollaboratorSelector {
    pub fn new(empty_policy: EmptyCommitPolicy) -> Self {
        Self {
            empty_policy,
            ..Self::default()
        }
    }

    /// Flips membership of `user_id`; returns whether it is now selected.
    pub fn toggle(&mut self, user_id: impl Into<UserId>) -> bool {
        let user_id = user_id.into();
        if self.selected.remove(&user_id) {
            false
        } else {
            self.selected.insert(user_id);
            true
        }
    }

    pub fn is_selected(&self, user_id: &str) -> bool {
        self.selected.contains(user_id)
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> + '_ {
        self.selected.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn commit(&mut self) -> CommitOutcome {
        if self.in_flight.is_some() {
            return CommitOutcome::AlreadyPending;
        }

        if self.selected.is_empty() && self.empty_policy == EmptyCommitPolicy::Skip {
            return CommitOutcome::Skipped;
        }

        let batch: Vec<UserId> = self.selected.iter().cloned().collect();
        self.in_flight = Some(batch.clone());
        CommitOutcome::Send(batch)
    }

    /// Store acknowledged the batch: clears the selection and returns the committed ids.
    pub fn on_committed(&mut self) -> Vec<UserId> {
        self.selected.clear();
        self.in_flight.take().unwrap_or_default()
    }

    /// Store rejected the batch: the selection is kept for a retry.
    pub fn on_commit_failed(&mut self) {
        self.in_flight = None;
    }

    pub fn cancel(&mut self) {
        self.selected.clear();
    }
}
