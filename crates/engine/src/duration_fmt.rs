// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parsing for the duration strings used by `await_event` timeouts and
//! `agent` step timeouts (spec §4.4, §4.5).

use std::time::Duration;

/// Parse a duration string like `"200ms"`, `"30s"`, `"5m"`, `"1h"`. Returns
/// `None` for an absent or unparseable value (spec §4.4: "an absent or
/// unparseable timeout yields an immediate error").
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split_at = s.find(|c: char| !c.is_ascii_digit() && c != '.')?;
    let (number, unit) = s.split_at(split_at);
    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    let millis = match unit {
        "ms" => value,
        "s" => value * 1_000.0,
        "m" => value * 60_000.0,
        "h" => value * 3_600_000.0,
        _ => return None,
    };
    Some(Duration::from_millis(millis as u64))
}

#[cfg(test)]
#[path = "duration_fmt_tests.rs"]
mod tests;
