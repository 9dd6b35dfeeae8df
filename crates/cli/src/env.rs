// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI crate.

use std::path::PathBuf;
use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Resolve the runs directory: MEOW_RUNS_DIR > XDG_STATE_HOME/meow > ~/.meow
pub fn runs_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("MEOW_RUNS_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("meow"));
    }
    meow_store::default_base_dir()
}

pub fn watchdog_interval_ms() -> Option<Duration> {
    parse_duration_ms("MEOW_WATCHDOG_INTERVAL_MS")
}

pub fn cleanup_grace_ms() -> Option<Duration> {
    parse_duration_ms("MEOW_CLEANUP_GRACE_MS")
}

pub fn log_filter() -> Option<String> {
    std::env::var("MEOW_LOG").ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
