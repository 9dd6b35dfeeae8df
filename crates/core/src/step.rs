// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduling primitive: a `Step` with a tagged executor config, a
//! dependency set, and a status that the Engine drives forward.

use crate::agent::AgentId;
use crate::error::StepError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;

crate::define_id! {
    /// Identifies a step within a `Run`. Dotted (`parent.child`) when the
    /// step was produced by an `expand`/`branch` expansion.
    pub struct StepId;
}

/// One of the six step executors. Tagged on `executor` so invariant 1
/// ("every step's Executor has its matching config populated and no
/// other") is enforced by the type system rather than a runtime check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "snake_case")]
pub enum StepConfig {
    Shell(ShellConfig),
    Spawn(SpawnConfig),
    Kill(KillConfig),
    Expand(ExpandConfig),
    Branch(BranchConfig),
    Agent(AgentConfig),
}

impl StepConfig {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            StepConfig::Shell(_) => ExecutorKind::Shell,
            StepConfig::Spawn(_) => ExecutorKind::Spawn,
            StepConfig::Kill(_) => ExecutorKind::Kill,
            StepConfig::Expand(_) => ExecutorKind::Expand,
            StepConfig::Branch(_) => ExecutorKind::Branch,
            StepConfig::Agent(_) => ExecutorKind::Agent,
        }
    }

    /// The agent this step is bound to, if any (`spawn`, `kill`, `agent`),
    /// used to enforce the one-in-flight-per-agent rule.
    pub fn bound_agent(&self) -> Option<&AgentId> {
        match self {
            StepConfig::Spawn(c) => Some(&c.agent),
            StepConfig::Kill(c) => Some(&c.agent),
            StepConfig::Agent(c) => Some(&c.agent),
            StepConfig::Shell(_) | StepConfig::Expand(_) | StepConfig::Branch(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Shell,
    Spawn,
    Kill,
    Expand,
    Branch,
    Agent,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorKind::Shell => "shell",
            ExecutorKind::Spawn => "spawn",
            ExecutorKind::Kill => "kill",
            ExecutorKind::Expand => "expand",
            ExecutorKind::Branch => "branch",
            ExecutorKind::Agent => "agent",
        };
        write!(f, "{s}")
    }
}

/// Declared source for a `shell` step's named output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellCapture {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellConfig {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Named outputs to capture from the process; `exit_code` is always
    /// captured in addition to whatever is declared here.
    #[serde(default)]
    pub capture: HashMap<String, ShellCapture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub agent: AgentId,
    pub workdir: PathBuf,
    #[serde(default)]
    pub tmux_session: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillConfig {
    pub agent: AgentId,
}

/// A child step to be inserted by an `expand`/`branch` executor. The
/// expression/condition language that decides which children apply is an
/// external collaborator (§1 Non-goals); by the time the executor runs,
/// `children` is already the resolved list to insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildSpec {
    /// Suffix appended to the parent's ID with a dot to form the child's
    /// `StepId` (e.g. parent `impl`, suffix `write-tests` => `impl.write-tests`).
    pub id_suffix: String,
    pub config: StepConfig,
    #[serde(default)]
    pub needs: BTreeSet<StepId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandConfig {
    pub children: Vec<ChildSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchConfig {
    pub children: Vec<ChildSpec>,
}

/// Declared output contract for an `agent` (or `shell`) step, validated
/// against the outputs an agent reports via `step_done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type")]
    pub output_type: OutputType,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "string[]")]
    StringArray,
    #[serde(rename = "bead_id")]
    BeadId,
    #[serde(rename = "bead_id[]")]
    BeadIdArray,
    #[serde(rename = "file_path")]
    FilePath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: AgentId,
    pub prompt: String,
    #[serde(default)]
    pub outputs: HashMap<String, OutputSpec>,
    /// Duration string (e.g. `"30s"`); enforced by the Engine, not the
    /// executor, since the agent has no built-in scheduling-level timeout.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// Step lifecycle status. Terminal states are `Done` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completing,
    Done,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completing => "completing",
            StepStatus::Done => "done",
            StepStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub config: StepConfig,
    pub status: StepStatus,
    #[serde(default)]
    pub started_at: Option<u64>,
    #[serde(default)]
    pub done_at: Option<u64>,
    #[serde(default)]
    pub needs: BTreeSet<StepId>,
    #[serde(default)]
    pub expanded_from: Option<StepId>,
    #[serde(default)]
    pub expanded_into: Vec<StepId>,
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub error: Option<StepError>,
}

impl Step {
    pub fn new(id: StepId, config: StepConfig, needs: BTreeSet<StepId>) -> Self {
        Self {
            id,
            config,
            status: StepStatus::Pending,
            started_at: None,
            done_at: None,
            needs,
            expanded_from: None,
            expanded_into: Vec::new(),
            outputs: HashMap::new(),
            error: None,
        }
    }

    pub fn executor_kind(&self) -> ExecutorKind {
        self.config.kind()
    }

    /// A step is ready iff pending and every dependency is done (invariant 3).
    pub fn is_ready(&self, steps: &HashMap<StepId, Step>) -> bool {
        self.status == StepStatus::Pending
            && self
                .needs
                .iter()
                .all(|dep| steps.get(dep).is_some_and(|s| s.status == StepStatus::Done))
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
