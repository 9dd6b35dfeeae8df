// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent runtime state tracked on a [`crate::run::Run`].

use crate::session::SessionId;
use crate::step::StepId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Runtime state for one agent participant of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Opaque handle to the agent's backing tmux session.
    pub tmux_session: String,
    pub status: AgentStatus,
    /// Used to resolve relative `file_path` outputs.
    pub workdir: PathBuf,
    pub current_step: Option<StepId>,
    /// Adapter-managed resume handle, if the adapter supports one.
    pub session_id: Option<SessionId>,
}

impl AgentInfo {
    pub fn new(tmux_session: impl Into<String>, workdir: PathBuf) -> Self {
        Self {
            tmux_session: tmux_session.into(),
            status: AgentStatus::Idle,
            workdir,
            current_step: None,
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Idle,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Active => "active",
            AgentStatus::Idle => "idle",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "agent_info_tests.rs"]
mod tests;
