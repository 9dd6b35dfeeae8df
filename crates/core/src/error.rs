// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds shared across the orchestrator core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorized failure reason for a step, surfaced by an Executor and
/// recorded on [`crate::step::Step::error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::NotFound, message)
    }

    pub fn already_terminal(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::AlreadyTerminal, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Validation, message)
    }

    pub fn executor_failure(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::ExecutorFailure, message)
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for StepError {}

/// Error kinds the core raises, per the error handling design table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepErrorKind {
    /// step/agent/run not present.
    NotFound,
    /// transition requested from a terminal state.
    AlreadyTerminal,
    /// output or config schema violation.
    Validation,
    /// malformed message or transport fault.
    IpcError,
    /// orchestrator executor returned non-zero / timeout.
    ExecutorFailure,
    /// atomic write failed.
    PersistenceFailure,
    /// cooperative cancellation or `await_event` timeout.
    CancelledOrTimedOut,
}

impl fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepErrorKind::NotFound => "not_found",
            StepErrorKind::AlreadyTerminal => "already_terminal",
            StepErrorKind::Validation => "validation",
            StepErrorKind::IpcError => "ipc_error",
            StepErrorKind::ExecutorFailure => "executor_failure",
            StepErrorKind::PersistenceFailure => "persistence_failure",
            StepErrorKind::CancelledOrTimedOut => "cancelled_or_timed_out",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
