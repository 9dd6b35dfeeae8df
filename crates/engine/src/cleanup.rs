// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run teardown (spec §4.6): `running -> cleaning_up`, kill every agent,
//! run the matching cleanup script, resolve the final status.

use meow_adapters::AgentAdapter;
use meow_core::{AgentId, Run, RunStatus};
use meow_shell::{ShellCommand, KILL_GRACE};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Result of a cleanup pass: the resolved terminal status plus any
/// per-agent kill failures, kept for diagnostics rather than failing the
/// whole run over a single stuck agent (best-effort per spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct CleanupReport {
    pub resolved_status: RunStatus,
    pub kill_failures: Vec<(AgentId, String)>,
}

/// Run the cleanup pass for `run`, which must already be `cleaning_up`
/// with `prior_status` set. Kills every registered agent (best-effort),
/// runs the configured script for `prior_status` if any, then resolves
/// `run.status`/`run.done_at` and clears `run.agents`.
pub async fn run_cleanup(run: &mut Run, adapter: &dyn AgentAdapter, now_ms: u64) -> CleanupReport {
    let prior_status = run.prior_status.unwrap_or(RunStatus::Failed);

    let mut kill_failures = Vec::new();
    let agent_ids: Vec<AgentId> = run.agents.keys().cloned().collect();
    for agent_id in agent_ids {
        if let Some(info) = run.agents.get(&agent_id) {
            if let Err(e) = adapter.stop(&info.tmux_session, KILL_GRACE).await {
                warn!(agent = %agent_id, "cleanup: failed to stop agent: {e}");
                kill_failures.push((agent_id.clone(), e.to_string()));
            }
        }
        run.agents.remove(&agent_id);
    }

    if let Some(script) = run.cleanup.for_status(prior_status) {
        let cmd = ShellCommand {
            command: script.to_string(),
            cwd: run.template.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")),
            env: Vec::new(),
        };
        match meow_shell::run(&cmd).await {
            Ok(output) if output.exit_code != 0 => {
                warn!(
                    exit_code = output.exit_code,
                    "cleanup script for {prior_status} exited non-zero"
                );
            }
            Err(e) => warn!("cleanup script for {prior_status} failed to run: {e}"),
            Ok(_) => {}
        }
    }

    run.status = prior_status;
    run.done_at = Some(now_ms);
    run.orchestrator_pid = 0;

    CleanupReport {
        resolved_status: prior_status,
        kill_failures,
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
