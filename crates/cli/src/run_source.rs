// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `RunSource`: the seam between this binary and whatever external
//! collaborator materializes a `Run` document from a template (spec §1 —
//! runbook/template parsing is out of scope here). [`JsonFileRunSource`]
//! is the implementation this crate ships for tests and examples; a real
//! deployment would plug in a collaborator that renders a template.

use std::path::PathBuf;

use meow_core::Run;

use crate::error::CliError;

/// Produces the `Run` this binary should attach to.
pub trait RunSource {
    fn load(&self) -> Result<Run, CliError>;
}

/// Reads a pre-materialized run document straight off disk as JSON.
pub struct JsonFileRunSource {
    path: PathBuf,
}

impl JsonFileRunSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RunSource for JsonFileRunSource {
    fn load(&self) -> Result<Run, CliError> {
        let text =
            std::fs::read_to_string(&self.path).map_err(|source| CliError::ReadRunFile {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| CliError::ParseRunFile {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
#[path = "run_source_tests.rs"]
mod tests;
