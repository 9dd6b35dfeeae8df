// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time abstraction so scheduling logic can be tested without real sleeps.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Source of time for the engine. Abstracted so tests can control elapsed
/// time deterministically instead of racing real clocks.
pub trait Clock: Clone + Send + Sync + 'static {
    /// A monotonic instant, used for elapsed-time comparisons.
    fn now(&self) -> Instant;

    /// Wall-clock time in milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;
}

/// Real wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct FakeClockState {
    epoch_ms: u64,
    base: Instant,
}

/// Deterministic clock for tests. Starts at a fixed epoch and only advances
/// when told to via [`FakeClock::advance`].
#[derive(Clone)]
pub struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeClock {
    /// Create a fake clock starting at epoch_ms = 0.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeClockState {
                epoch_ms: 0,
                base: Instant::now(),
            })),
        }
    }

    /// Create a fake clock starting at a given epoch.
    pub fn at(epoch_ms: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeClockState {
                epoch_ms,
                base: Instant::now(),
            })),
        }
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        let mut state = self.state.lock();
        state.epoch_ms += ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        // Instant has no settable constructor; express elapsed fake time as
        // an offset from a fixed base so relative comparisons still work.
        let state = self.state.lock();
        state.base + std::time::Duration::from_millis(state.epoch_ms)
    }

    fn epoch_ms(&self) -> u64 {
        self.state.lock().epoch_ms
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
