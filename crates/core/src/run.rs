// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `Run`: a workflow instance and its step/agent state.

use crate::agent::AgentId;
use crate::agent_info::AgentInfo;
use crate::step::{Step, StepId, StepStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a workflow instance.
    pub struct RunId;
}

/// Run lifecycle status (spec.md §3 invariants 5-7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    CleaningUp,
    Done,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed | RunStatus::Stopped)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::CleaningUp => "cleaning_up",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Opt-in shell commands run by the Cleanup manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupScripts {
    #[serde(default)]
    pub on_success: Option<String>,
    #[serde(default)]
    pub on_failure: Option<String>,
    #[serde(default)]
    pub on_stop: Option<String>,
}

impl CleanupScripts {
    /// The script matching a given terminal status, if one was declared.
    pub fn for_status(&self, status: RunStatus) -> Option<&str> {
        match status {
            RunStatus::Done => self.on_success.as_deref(),
            RunStatus::Failed => self.on_failure.as_deref(),
            RunStatus::Stopped => self.on_stop.as_deref(),
            RunStatus::Pending | RunStatus::Running | RunStatus::CleaningUp => None,
        }
    }
}

/// A workflow instance: its declared steps, live agents, and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub template: PathBuf,
    pub status: RunStatus,
    pub started_at: Option<u64>,
    pub done_at: Option<u64>,
    /// Zero when no live orchestrator process is managing this run.
    #[serde(default)]
    pub orchestrator_pid: u32,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    pub default_adapter: String,
    #[serde(default)]
    pub cleanup: CleanupScripts,
    /// Status recorded when entering `cleaning_up`, used to resolve the
    /// final status once cleanup completes.
    #[serde(default)]
    pub prior_status: Option<RunStatus>,
    #[serde(default)]
    pub agents: HashMap<AgentId, AgentInfo>,
    #[serde(default)]
    pub steps: HashMap<StepId, Step>,
}

impl Run {
    pub fn new(id: RunId, template: PathBuf, default_adapter: impl Into<String>) -> Self {
        Self {
            id,
            template,
            status: RunStatus::Pending,
            started_at: None,
            done_at: None,
            orchestrator_pid: 0,
            variables: HashMap::new(),
            default_adapter: default_adapter.into(),
            cleanup: CleanupScripts::default(),
            prior_status: None,
            agents: HashMap::new(),
            steps: HashMap::new(),
        }
    }

    /// All `pending` steps whose dependencies are all `done`, sorted by
    /// step ID ascending for deterministic dispatch order (spec.md §4.5a).
    pub fn ready_steps(&self) -> Vec<&StepId> {
        let mut ready: Vec<&StepId> = self
            .steps
            .iter()
            .filter(|(_, step)| step.is_ready(&self.steps))
            .map(|(id, _)| id)
            .collect();
        ready.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ready
    }

    /// Whether any step bound to `agent` is currently `running` or
    /// `completing` (invariant 4: at most one in flight per agent).
    pub fn agent_has_step_in_flight(&self, agent: &AgentId) -> bool {
        self.steps.values().any(|step| {
            matches!(step.status, StepStatus::Running | StepStatus::Completing)
                && step.config.bound_agent() == Some(agent)
        })
    }

    pub fn all_steps_terminal(&self) -> bool {
        self.steps.values().all(|step| step.status.is_terminal())
    }

    pub fn any_step_failed(&self) -> bool {
        self.steps
            .values()
            .any(|step| step.status == StepStatus::Failed)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
