// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory pub/sub for agent-emitted events (spec §4.3). Unlike the
//! teacher's WAL-backed event bus, this one buffers nothing: an event with
//! no matching waiter is simply dropped, and a waiter that times out can
//! never receive a late match.

use meow_core::Event;
use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("no matching event within the timeout")]
    Timeout,
    #[error("waiter cancelled")]
    Cancelled,
}

struct Waiter {
    id: u64,
    event_type: String,
    filter: HashMap<String, Value>,
    tx: oneshot::Sender<Event>,
}

/// Publish/subscribe broker. `Publish` is non-blocking; `Subscribe`
/// registers a waiter before returning control to the caller, so a publish
/// racing a fresh subscription is never missed (spec §4.3's race rule).
pub struct EventBus {
    waiters: RwLock<Vec<Waiter>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            waiters: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Deliver `event` to every still-registered waiter whose filter
    /// matches (spec §4.3: "delivers to every matching waiter"), removing
    /// each as it's matched. An event that matches nobody is dropped.
    ///
    /// Takes the read lock to find matches (spec §5: "publishing acquires
    /// a read lock"), only upgrading to the write lock if there's anything
    /// to remove.
    pub fn publish(&self, event: Event) {
        let waiters = self.waiters.upgradable_read();
        let matched: Vec<usize> = waiters
            .iter()
            .enumerate()
            .filter(|(_, w)| event.matches(&w.event_type, &w.filter))
            .map(|(i, _)| i)
            .collect();
        if matched.is_empty() {
            return;
        }

        let mut waiters = RwLockUpgradableReadGuard::upgrade(waiters);
        for &i in matched.iter().rev() {
            let waiter = waiters.remove(i);
            let _ = waiter.tx.send(event.clone());
        }
    }

    /// Register a waiter matching `event_type` and `filter`, then block
    /// until a matching event arrives or `timeout` elapses.
    pub async fn subscribe(
        &self,
        event_type: impl Into<String>,
        filter: HashMap<String, Value>,
        timeout: Duration,
    ) -> Result<Event, EventBusError> {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.waiters.write().push(Waiter {
            id,
            event_type: event_type.into(),
            filter,
            tx,
        });

        tokio::select! {
            result = rx => result.map_err(|_| EventBusError::Cancelled),
            () = tokio::time::sleep(timeout) => {
                self.waiters.write().retain(|w| w.id != id);
                Err(EventBusError::Timeout)
            }
        }
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        self.waiters.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
