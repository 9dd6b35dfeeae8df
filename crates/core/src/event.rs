// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-emitted events, as published through the EventBus.

use crate::agent::AgentId;
use crate::run::RunId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An occurrence emitted by an agent, stamped with provenance by the
/// `event` IPC handler before being published on the EventBus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub agent: AgentId,
    pub run: RunId,
    pub timestamp: u64,
}

impl Event {
    /// Returns whether this event matches an `await_event` filter: exact
    /// `event_type` equality, plus every filter key present in `data` with
    /// a string-equal value (spec §4.3: "key-value subset match on Data ...
    /// with string-equal values"), so a numeric `0` and the string `"0"`
    /// are the same match regardless of which side is typed which way.
    pub fn matches(&self, event_type: &str, filter: &HashMap<String, serde_json::Value>) -> bool {
        if self.event_type != event_type {
            return false;
        }
        filter
            .iter()
            .all(|(key, value)| self.data.get(key).is_some_and(|v| values_string_equal(v, value)))
    }
}

/// Compares two `serde_json::Value`s the way spec §4.3's filter match wants:
/// `"0"` and `0`, or `"true"` and `true`, are the same value. Strings
/// compare as their own contents rather than a quoted JSON rendering.
fn values_string_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    value_as_match_string(a) == value_as_match_string(b)
}

fn value_as_match_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
