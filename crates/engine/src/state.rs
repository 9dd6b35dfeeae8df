// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run-scoped context shared by every handler and the Engine loop
//! (spec §5, design note §9: "pass a run-scoped context object ... do not
//! use process-global singletons"). Holding the lock across persistence is
//! intentional — it's the only suspension point allowed while the run
//! mutex is held.

use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::validation::BeadIdChecker;
use meow_core::{Clock, Run, StepId};
use meow_store::RunStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, MutexGuard};

/// Bounded exponential backoff for persistence retries (spec §4.5's last
/// bullet / §7's `PersistenceFailure` row): three retries at 50/200/800ms
/// after the initial attempt.
const RETRY_BACKOFFS_MS: [u64; 3] = [50, 200, 800];

/// Generic over `Clock` rather than boxing it as `dyn Clock`: `Clock`'s
/// `Clone` supertrait makes it non-object-safe, and tests want a
/// deterministic `FakeClock` in this same slot (spec §9's testability
/// goals).
pub struct RunHandle<C: Clock> {
    run: Mutex<Run>,
    store: RunStore,
    events: EventBus,
    clock: C,
    completions: mpsc::UnboundedSender<StepId>,
    checker: Option<Arc<dyn BeadIdChecker>>,
}

impl<C: Clock> RunHandle<C> {
    pub fn new(
        run: Run,
        store: RunStore,
        clock: C,
        completions: mpsc::UnboundedSender<StepId>,
        checker: Option<Arc<dyn BeadIdChecker>>,
    ) -> Self {
        Self {
            run: Mutex::new(run),
            store,
            events: EventBus::new(),
            clock,
            completions,
            checker,
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Run> {
        self.run.lock().await
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn checker(&self) -> Option<&dyn BeadIdChecker> {
        self.checker.as_deref()
    }

    /// Wake the Engine loop: a step has moved into `completing` and is
    /// waiting for the `completing -> done` transition.
    pub fn notify_completion(&self, step: StepId) {
        let _ = self.completions.send(step);
    }

    /// Persist `run`, retrying with backoff on failure. The caller is
    /// expected to hold the run lock for the duration of the call so the
    /// state transition and the store write are observed together.
    pub async fn persist(&self, run: &Run) -> Result<(), EngineError> {
        match self.store.save(run) {
            Ok(()) => return Ok(()),
            Err(mut last_err) => {
                for backoff_ms in RETRY_BACKOFFS_MS {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    match self.store.save(run) {
                        Ok(()) => return Ok(()),
                        Err(e) => last_err = e,
                    }
                }
                Err(EngineError::PersistenceFailure(last_err))
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
