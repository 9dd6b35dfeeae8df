// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI-level errors, each mapped to one of the three exit codes the binary
//! can return (spec §6): 0 done, 1 failed/stopped, 2 everything else
//! (a run could not even be loaded, attached, or scheduled).

use meow_engine::EngineError;
use meow_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to read run file {}: {source}", path.display())]
    ReadRunFile {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run file {} is not a valid run document: {source}", path.display())]
    ParseRunFile {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no runs directory configured: set MEOW_RUNS_DIR or HOME")]
    NoRunsDir,
    #[error("failed to create runs directory {}: {source}", path.display())]
    CreateRunsDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CliError {
    /// The process exit code this error maps to. Every variant here means
    /// the run never reached a terminal status under engine control, so
    /// none of them overlap with the run-status exit codes in
    /// [`crate::exit_code_for_status`].
    pub fn exit_code(&self) -> i32 {
        2
    }
}
