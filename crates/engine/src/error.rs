// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The engine's root error type, mapping 1:1 onto the error-kind table in
//! spec §7. Every public fallible function in this crate returns
//! `Result<_, EngineError>` or a narrower type with a `From` impl into it.

use meow_core::{StepError, StepErrorKind};
use meow_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("ipc error: {0}")]
    Ipc(String),

    #[error("executor failed: {0}")]
    ExecutorFailure(String),

    #[error("persistence failed after retries: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("cancelled or timed out")]
    CancelledOrTimedOut,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn kind(&self) -> StepErrorKind {
        match self {
            EngineError::NotFound(_) => StepErrorKind::NotFound,
            EngineError::AlreadyTerminal(_) => StepErrorKind::AlreadyTerminal,
            EngineError::Validation(_) => StepErrorKind::Validation,
            EngineError::Ipc(_) => StepErrorKind::IpcError,
            EngineError::ExecutorFailure(_) => StepErrorKind::ExecutorFailure,
            EngineError::PersistenceFailure(_) => StepErrorKind::PersistenceFailure,
            EngineError::CancelledOrTimedOut => StepErrorKind::CancelledOrTimedOut,
            EngineError::Io(_) => StepErrorKind::ExecutorFailure,
        }
    }

    pub fn into_step_error(self) -> StepError {
        let kind = self.kind();
        StepError::new(kind, self.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
