// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identifier and adapter-facing error types.
//!
//! `AgentId` names a logical agent participant in a run (bound to one or
//! more `agent` steps over its lifetime). The concrete session backing an
//! agent (e.g. a tmux pane) is tracked separately in [`crate::agent_info::AgentInfo`].

use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an agent participant within a run.
    ///
    /// Distinct from [`crate::session::SessionId`], which names the
    /// underlying adapter session (tmux pane, etc.) an agent currently
    /// occupies.
    pub struct AgentId;
}

/// Categorized failure reasons surfaced by the Adapter collaborator when
/// spawning, prompting, or stopping an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentError {
    /// The named agent has no registered session.
    NotFound,
    /// The adapter's spawn call failed.
    SpawnFailed(String),
    /// Delivering a prompt into the agent's session failed.
    DeliveryFailed(String),
    /// Other adapter-specific error with a message.
    Other(String),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::NotFound => write!(f, "agent not found"),
            AgentError::SpawnFailed(msg) => write!(f, "spawn failed: {msg}"),
            AgentError::DeliveryFailed(msg) => write!(f, "prompt delivery failed: {msg}"),
            AgentError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for AgentError {}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
