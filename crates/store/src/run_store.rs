// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic on-disk persistence for `Run` documents.
//!
//! One JSON file per run under the runs directory, named `<run-id>.json`.
//! Writes go to a `.tmp` sibling, are `sync_all`'d, then renamed into
//! place — a crash mid-write never leaves a half-written document behind.
//! There is no WAL: a `Run`'s persisted size is bounded by its step count,
//! so a snapshot rewrite on every save is cheap enough (spec §9).

use meow_core::{Run, RunId};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run {0} not found")]
    NotFound(RunId),
    #[error("run {0} is corrupt on disk: {1}")]
    Corrupt(RunId, serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-value-by-ID store of `Run` documents rooted at a runs directory.
///
/// Does not hold locks across calls; concurrency control (the per-run
/// mutex) is the caller's responsibility (spec §4.1).
#[derive(Debug, Clone)]
pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    /// Open a store rooted at `base_dir`, creating the runs directory if
    /// it doesn't already exist.
    pub fn open(base_dir: &Path) -> Result<Self, StoreError> {
        let runs_dir = runs_dir(base_dir);
        fs::create_dir_all(&runs_dir)?;
        Ok(Self { runs_dir })
    }

    fn path_for(&self, id: &RunId) -> PathBuf {
        self.runs_dir.join(format!("{}.json", id.as_str()))
    }

    /// Atomically replace the on-disk document for `run.id`.
    pub fn save(&self, run: &Run) -> Result<(), StoreError> {
        let path = self.path_for(&run.id);
        let tmp_path = path.with_extension("json.tmp");

        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, run)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Return a deep copy of the persisted run, or `NotFound` if absent or
    /// unreadable. Corrupt documents are rotated to `.bak` rather than
    /// silently starting fresh — there is no WAL to recover the run from.
    pub fn get(&self, id: &RunId) -> Result<Run, StoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id.clone()));
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        match serde_json::from_reader(reader) {
            Ok(run) => Ok(run),
            Err(e) => {
                let bak_path = rotate_bak_path(&path);
                warn!(
                    run = %id,
                    error = %e,
                    bak = %bak_path.display(),
                    "corrupt run document, rotating to .bak",
                );
                fs::rename(&path, &bak_path)?;
                Err(StoreError::Corrupt(id.clone(), e))
            }
        }
    }

    /// The set of run IDs present in the store.
    pub fn list(&self) -> Result<Vec<RunId>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.runs_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(RunId::new(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove the persisted document for `id`. A missing document is not
    /// an error.
    pub fn delete(&self, id: &RunId) -> Result<(), StoreError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Release any per-store resources. A no-op for the filesystem
    /// backend, present for contract parity (spec §4.1) with stores that
    /// hold live handles.
    pub fn close(&self) {}
}

/// The runs directory under a base directory (e.g. `<home>/.meow/runs`).
pub fn runs_dir(base: &Path) -> PathBuf {
    base.join("runs")
}

/// Default base directory: `<home>/.meow`.
pub fn default_base_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".meow"))
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "run_store_tests.rs"]
mod tests;
