// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Scheduler (spec §4.5): the control loop that attaches to a
//! persisted `Run`, recovers from a crash, and drives dependency-ordered
//! dispatch until the run reaches a terminal status.

use std::sync::Arc;
use std::time::Duration;

use meow_adapters::AgentAdapter;
use meow_core::{
    Clock, ExecutorKind, Run, RunId, RunStatus, StepConfig, StepError, StepErrorKind, StepId,
    StepStatus,
};
use meow_store::{RunStore, StoreError};
use tokio::sync::mpsc;
use tracing::{info, info_span, warn};

use crate::cancel::CancelToken;
use crate::cleanup;
use crate::duration_fmt::parse_duration;
use crate::error::EngineError;
use crate::executor::{self, ExecOutcome, ExecutorContext};
use crate::ipc;
use crate::state::RunHandle;
use crate::validation::BeadIdChecker;

/// Tunables for the control loop, distinct from anything the template
/// language configures (spec §12: run-level, not workflow-level,
/// configuration).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the loop wakes up with nothing else to do, to notice a
    /// timed-out agent step even with no IPC traffic.
    pub watchdog_interval: Duration,
    /// Upper bound on how long a cleanup pass (agent kills + script) is
    /// allowed to run before the Engine finalizes the run anyway (spec §5:
    /// "waits up to a bounded grace period for cleanup scripts"). A second
    /// stop request is not modeled here; exceeding the grace period is the
    /// only escalation (spec §9 Open Question, resolved in DESIGN.md).
    pub cleanup_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_millis(500),
            cleanup_grace: Duration::from_secs(30),
        }
    }
}

/// The control loop owner. Constructed via [`Engine::attach`], consumed by
/// [`Engine::run`].
pub struct Engine<C: Clock> {
    handle: Arc<RunHandle<C>>,
    completions: mpsc::UnboundedReceiver<StepId>,
    adapter: Arc<dyn AgentAdapter>,
    cancel: CancelToken,
    clock: C,
    config: EngineConfig,
}

impl<C: Clock> Engine<C> {
    /// Attach to `run_id` (spec §4.5 steps 1-3): load the `Run`, refuse a
    /// terminal run, reset crashed orchestrator-executor steps to
    /// `pending`, claim ownership by writing this process's PID, and
    /// persist the `running` transition.
    pub async fn attach(
        run_id: &RunId,
        store: RunStore,
        clock: C,
        adapter: Arc<dyn AgentAdapter>,
        checker: Option<Arc<dyn BeadIdChecker>>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut run = store.get(run_id).map_err(|e| match e {
            StoreError::NotFound(id) => EngineError::NotFound(format!("run {id} not found")),
            other => EngineError::PersistenceFailure(other),
        })?;

        if run.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(format!(
                "run {} is already {}",
                run.id, run.status
            )));
        }

        recover_crashed_steps(&mut run);

        run.orchestrator_pid = std::process::id();
        run.status = RunStatus::Running;
        if run.started_at.is_none() {
            run.started_at = Some(clock.epoch_ms());
        }
        store.save(&run)?;

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let handle = Arc::new(RunHandle::new(
            run,
            store,
            clock.clone(),
            completions_tx,
            checker,
        ));

        Ok(Self {
            handle,
            completions: completions_rx,
            adapter,
            cancel: CancelToken::new(),
            clock,
            config,
        })
    }

    /// A clone of this Engine's root cancellation token, for a caller
    /// (the orchestrator host's signal handling) to request a stop.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run_handle(&self) -> Arc<RunHandle<C>> {
        Arc::clone(&self.handle)
    }

    /// A deep copy of the run as it currently stands.
    pub async fn snapshot(&self) -> Run {
        self.handle.lock().await.clone()
    }

    /// Drive the run to a terminal status (spec §4.5 steps 4-6). Starts
    /// the IPC server, then loops: dispatch what's ready, fail any agent
    /// step that exceeded its declared timeout, drain completions the IPC
    /// handlers have queued, and check whether the run is now terminal.
    /// When there's nothing to do, suspends on the next completion, the
    /// watchdog tick, or cancellation (spec §4.5 step 5d).
    pub async fn run(mut self) -> Result<RunStatus, EngineError> {
        let run_id = self.handle.lock().await.id.clone();
        let ipc = ipc::server::start(&run_id, Arc::clone(&self.handle)).await?;
        info!(run = %run_id, socket = %ipc.socket_path().display(), "ipc server listening");

        let mut watchdog = tokio::time::interval(self.config.watchdog_interval);
        watchdog.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut idle_streak: u32 = 0;

        let terminal_status = loop {
            if self.cancel.is_cancelled() {
                break self.finalize(RunStatus::Stopped).await?;
            }

            let dispatched = self.dispatch_ready_steps().await?;
            let timed_out = self.fail_timed_out_agents().await?;

            let mut drained = false;
            while let Ok(step_id) = self.completions.try_recv() {
                self.complete_step(step_id).await?;
                drained = true;
            }

            if let Some(reason) = self.check_terminal().await {
                break self.finalize(reason).await?;
            }

            if dispatched || timed_out || drained {
                idle_streak = 0;
                continue;
            }

            // Genuinely stuck (spec §8: an injected dependency cycle must
            // not deadlock the scheduler) means steps are left `pending`
            // with nothing `running`/`completing` that could ever unblock
            // them. A `pending` step downstream of a live `agent` step
            // in `running` is normal operation, not a stall, since that
            // agent's `step_done` may still arrive.
            let is_stuck = {
                let run = self.handle.lock().await;
                run.steps.values().any(|s| s.status == StepStatus::Pending)
                    && !run.steps.values().any(|s| {
                        matches!(s.status, StepStatus::Running | StepStatus::Completing)
                    })
            };
            if is_stuck {
                idle_streak += 1;
                if idle_streak >= 2 {
                    warn!(run = %run_id, "no ready steps and nothing in flight; no-progress failure");
                    break self.finalize(RunStatus::Failed).await?;
                }
            } else {
                idle_streak = 0;
            }

            tokio::select! {
                _ = watchdog.tick() => {}
                Some(step_id) = self.completions.recv() => {
                    self.complete_step(step_id).await?;
                }
                () = self.cancel.cancelled() => {}
            }
        };

        ipc.shutdown().await;
        Ok(terminal_status)
    }

    /// Dispatch every currently-ready step (spec §4.5a-c), in ascending
    /// step-ID order, skipping an `agent` step whose agent already has a
    /// step in flight. Returns whether anything was dispatched.
    ///
    /// `shell`/`spawn`/`kill`/`agent` executors suspend (a child-process
    /// wait or adapter I/O) — spec §5 allows no suspension while the run
    /// mutex is held other than around persistence, so those run against a
    /// detached clone with the lock dropped, and only the resulting agent
    /// registry is merged back once it's reacquired. `expand`/`branch` have
    /// no suspension point and run directly under the lock.
    async fn dispatch_ready_steps(&mut self) -> Result<bool, EngineError> {
        let ready: Vec<StepId> = {
            let run = self.handle.lock().await;
            run.ready_steps().into_iter().cloned().collect()
        };
        if ready.is_empty() {
            return Ok(false);
        }

        let mut dispatched_any = false;
        for step_id in ready {
            let mut run = self.handle.lock().await;

            // The ready-set snapshot may be stale by the time we get here
            // (an earlier step in this same batch may have bound the same
            // agent) — re-check before dispatching.
            let Some(step) = run.steps.get(&step_id) else {
                continue;
            };
            if step.status != StepStatus::Pending {
                continue;
            }
            if let Some(agent) = step.config.bound_agent() {
                if run.agent_has_step_in_flight(agent) {
                    continue;
                }
            }

            let started_at = self.clock.epoch_ms();
            if let Some(step) = run.steps.get_mut(&step_id) {
                step.status = StepStatus::Running;
                step.started_at = Some(started_at);
            }
            self.handle.persist(&run).await?;

            let kind = run.steps[&step_id].executor_kind();
            let ctx = ExecutorContext {
                adapter: Arc::clone(&self.adapter),
                cancel: self.cancel.clone(),
            };

            if matches!(kind, ExecutorKind::Expand | ExecutorKind::Branch) {
                let _span = info_span!("dispatch", run = %run.id, step = %step_id).entered();
                let outcome = executor::execute(&mut run, &step_id, &ctx).await;
                dispatched_any = true;
                self.apply_outcome(&mut run, &step_id, outcome);
                self.handle.persist(&run).await?;
                continue;
            }

            let mut detached = run.clone();
            drop(run);

            let outcome = {
                let _span = info_span!("dispatch", run = %detached.id, step = %step_id).entered();
                executor::execute(&mut detached, &step_id, &ctx).await
            };
            dispatched_any = true;

            let mut run = self.handle.lock().await;
            run.agents = detached.agents;
            self.apply_outcome(&mut run, &step_id, outcome);
            self.handle.persist(&run).await?;
        }

        Ok(dispatched_any)
    }

    fn apply_outcome(&self, run: &mut Run, step_id: &StepId, outcome: ExecOutcome) {
        match outcome {
            ExecOutcome::Started => {
                // `agent` executor only: stays `running`, completion
                // arrives later over IPC as a `step_done` request.
            }
            ExecOutcome::Done(outputs) => {
                if let Some(step) = run.steps.get_mut(step_id) {
                    step.status = StepStatus::Done;
                    step.outputs = outputs;
                    step.done_at = Some(self.clock.epoch_ms());
                }
            }
            ExecOutcome::Failed(err) => {
                warn!(step = %step_id, "step failed: {err}");
                if let Some(step) = run.steps.get_mut(step_id) {
                    step.status = StepStatus::Failed;
                    step.error = Some(err);
                    step.done_at = Some(self.clock.epoch_ms());
                }
            }
        }
    }

    /// Transition a step the IPC `step_done` handler already moved to
    /// `completing` the rest of the way to `done` (spec §4.4/§4.5e): the
    /// handler validates and stores outputs, but only the Engine's own
    /// thread performs the terminal transition, keeping run mutation
    /// single-writer even though the mutex would technically allow either
    /// side to do it.
    async fn complete_step(&mut self, step_id: StepId) -> Result<(), EngineError> {
        let mut run = self.handle.lock().await;
        if let Some(step) = run.steps.get_mut(&step_id) {
            if step.status == StepStatus::Completing {
                step.status = StepStatus::Done;
                step.done_at = Some(self.clock.epoch_ms());
            }
        }
        self.handle.persist(&run).await
    }

    /// Fail any `running` `agent` step whose declared `timeout` has
    /// elapsed (spec §5: "a timeout, if declared on the step, is enforced
    /// by the Engine"). Returns whether any step was failed this pass.
    async fn fail_timed_out_agents(&mut self) -> Result<bool, EngineError> {
        let now = self.clock.epoch_ms();
        let mut run = self.handle.lock().await;

        let timed_out: Vec<StepId> = run
            .steps
            .iter()
            .filter_map(|(id, step)| {
                if step.status != StepStatus::Running || step.executor_kind() != ExecutorKind::Agent
                {
                    return None;
                }
                let StepConfig::Agent(cfg) = &step.config else {
                    return None;
                };
                let timeout = parse_duration(cfg.timeout.as_deref()?)?;
                let started_at = step.started_at?;
                if now.saturating_sub(started_at) >= timeout.as_millis() as u64 {
                    Some(id.clone())
                } else {
                    None
                }
            })
            .collect();

        if timed_out.is_empty() {
            return Ok(false);
        }

        for step_id in &timed_out {
            warn!(step = %step_id, "agent step timed out");
            if let Some(step) = run.steps.get_mut(step_id) {
                step.status = StepStatus::Failed;
                step.error = Some(StepError::new(
                    StepErrorKind::CancelledOrTimedOut,
                    "agent step exceeded its declared timeout",
                ));
                step.done_at = Some(now);
            }
        }
        self.handle.persist(&run).await?;
        Ok(true)
    }

    /// Whether the run is now terminal: any failed step fails the whole
    /// run (spec §4.5: "a step that transitions to failed cascades ...
    /// the cleanup policy fires and the run goes terminal"); otherwise
    /// every step terminal means the run is done. Empty `Steps` satisfies
    /// `all()` vacuously, so a workflow with no steps is immediately done
    /// (spec §8 boundary behavior).
    async fn check_terminal(&self) -> Option<RunStatus> {
        let run = self.handle.lock().await;
        if run.any_step_failed() {
            Some(RunStatus::Failed)
        } else if run.all_steps_terminal() {
            Some(RunStatus::Done)
        } else {
            None
        }
    }

    /// Run teardown (spec §4.6): `running -> cleaning_up` with
    /// `prior_status = reason`, then the Cleanup manager's kill-every-agent
    /// and opt-in script, bounded by `cleanup_grace`. Returns the final
    /// resolved status.
    async fn finalize(&mut self, reason: RunStatus) -> Result<RunStatus, EngineError> {
        {
            let mut run = self.handle.lock().await;
            run.prior_status = Some(reason);
            run.status = RunStatus::CleaningUp;
            self.handle.persist(&run).await?;
        }

        let mut run = self.handle.lock().await;
        let cleanup_fut = cleanup::run_cleanup(&mut run, self.adapter.as_ref(), self.clock.epoch_ms());
        match tokio::time::timeout(self.config.cleanup_grace, cleanup_fut).await {
            Ok(report) => {
                for (agent, err) in &report.kill_failures {
                    warn!(agent = %agent, "cleanup: failed to stop agent: {err}");
                }
                self.handle.persist(&run).await?;
                Ok(report.resolved_status)
            }
            Err(_) => {
                warn!(run = %run.id, "cleanup exceeded its grace period; finalizing without it");
                run.status = reason;
                run.done_at = Some(self.clock.epoch_ms());
                run.orchestrator_pid = 0;
                self.handle.persist(&run).await?;
                Ok(reason)
            }
        }
    }
}

/// Reset crashed orchestrator-executor steps to `pending` so they're
/// retried; `agent` steps whose status is `running` are left alone, since
/// the agent may genuinely still be working and a later `step_done` will
/// arrive (spec §4.5 step 2).
fn recover_crashed_steps(run: &mut Run) {
    for step in run.steps.values_mut() {
        if step.status == StepStatus::Running && step.executor_kind() != ExecutorKind::Agent {
            info!(step = %step.id, "recovering crashed orchestrator-executor step to pending");
            step.status = StepStatus::Pending;
            step.started_at = None;
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
