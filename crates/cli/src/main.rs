// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! meow: a thin orchestrator host. Loads a pre-materialized run document,
//! attaches the Engine to it, and drives it to a terminal status.
//!
//! This binary does not parse templates, select adapters by name, or
//! expose any subcommand surface beyond "run this document" — those are
//! external collaborators (see `run_source::RunSource`).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod env;
mod error;
mod run_source;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use meow_adapters::{AgentAdapter, NoOpSessionAdapter, SessionBackedAgentAdapter, TmuxAdapter};
use meow_core::{RunId, RunStatus, SystemClock};
use meow_engine::{Engine, EngineConfig};
use meow_store::RunStore;
use tracing::{error, info};

use crate::error::CliError;
use crate::run_source::{JsonFileRunSource, RunSource};

/// Attach to and drive a persisted orchestrator run to completion.
#[derive(Parser, Debug)]
#[command(name = "meow", version, about)]
struct Args {
    /// Path to a materialized run document (JSON). Only read if the run
    /// isn't already persisted under the runs directory.
    run_file: PathBuf,

    /// Override the runs directory (defaults to MEOW_RUNS_DIR, then
    /// XDG_STATE_HOME/meow, then ~/.meow).
    #[arg(long)]
    runs_dir: Option<PathBuf>,

    /// Use a no-op session adapter instead of spawning real tmux sessions.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let _log_guard = setup_logging();

    match run(args).await {
        Ok(status) => std::process::exit(exit_code_for_status(status)),
        Err(err) => {
            error!("{err}");
            std::process::exit(err.exit_code());
        }
    }
}

async fn run(args: Args) -> Result<RunStatus, CliError> {
    let source = JsonFileRunSource::new(&args.run_file);
    let run = source.load()?;
    let run_id = run.id.clone();

    let base_dir = args
        .runs_dir
        .or_else(env::runs_dir)
        .ok_or(CliError::NoRunsDir)?;
    std::fs::create_dir_all(&base_dir).map_err(|source| CliError::CreateRunsDir {
        path: base_dir.clone(),
        source,
    })?;
    let store = RunStore::open(&base_dir)?;

    if !already_persisted(&store, &run_id) {
        store.save(&run)?;
    }

    let adapter: Arc<dyn AgentAdapter> = if args.dry_run {
        Arc::new(SessionBackedAgentAdapter::new(NoOpSessionAdapter::new()))
    } else {
        Arc::new(SessionBackedAgentAdapter::new(TmuxAdapter::new()))
    };

    let mut config = EngineConfig::default();
    if let Some(interval) = env::watchdog_interval_ms() {
        config.watchdog_interval = interval;
    }
    if let Some(grace) = env::cleanup_grace_ms() {
        config.cleanup_grace = grace;
    }

    info!(run = %run_id, "attaching engine");
    let engine = Engine::attach(&run_id, store, SystemClock, adapter, None, config).await?;
    let status = engine.run().await?;
    info!(run = %run_id, status = %status, "run reached a terminal status");
    Ok(status)
}

fn already_persisted(store: &RunStore, run_id: &RunId) -> bool {
    store.get(run_id).is_ok()
}

/// Maps the terminal `RunStatus` to a process exit code: 0 for a clean
/// completion, 1 for anything that didn't finish successfully. The
/// non-terminal variants can't actually come back from `engine.run()`, but
/// are mapped defensively rather than treated as unreachable.
fn exit_code_for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Done => 0,
        RunStatus::Failed | RunStatus::Stopped => 1,
        RunStatus::Pending | RunStatus::Running | RunStatus::CleaningUp => 2,
    }
}

fn setup_logging() -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    let filter = env::log_filter()
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    guard
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
