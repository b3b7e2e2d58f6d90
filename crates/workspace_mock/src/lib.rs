//! Deterministic in-memory implementations of the `workspace_protocol` services.
//!
//! This crate contains no network, process or storage logic. It is intended
//! for local development and for integration tests that need to observe every
//! call a workspace makes, in order.

use std::sync::{Mutex, MutexGuard};

pub mod channel;
pub mod sandbox;
pub mod store;

pub use channel::{ChannelCall, MockChannel, MockChannelHub};
pub use sandbox::{MockSandbox, ProcessScript, SandboxCall};
pub use store::{MockProjectStore, StoreCall};

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
