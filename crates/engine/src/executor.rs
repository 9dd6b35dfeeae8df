// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor dispatch (spec §4.5c, design note §9): the six step executors
//! modelled as one capability — "execute one step, yielding outputs or
//! error" — parameterized over the tagged `StepConfig`. Orchestrator
//! executors are synchronous; `agent` only starts the work.

use crate::cancel::CancelToken;
use meow_adapters::AgentAdapter;
use meow_core::{
    AgentInfo, AgentStatus, ExecutorKind, Run, Step, StepConfig, StepError, StepId,
};
use meow_shell::{ShellCommand, ShellOutput};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info_span;

/// Outcome of dispatching one step. `Started` is only ever produced by the
/// `agent` executor — completion arrives later over IPC.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Done(HashMap<String, Value>),
    Failed(StepError),
    Started,
}

/// Shared collaborators every executor needs.
pub struct ExecutorContext {
    pub adapter: Arc<dyn AgentAdapter>,
    pub cancel: CancelToken,
}

/// Dispatch `step_id` to its matching executor. Mutates `run` in place for
/// executors that register agents or insert expansion children.
pub async fn execute(run: &mut Run, step_id: &StepId, ctx: &ExecutorContext) -> ExecOutcome {
    let kind = match run.steps.get(step_id) {
        Some(step) => step.executor_kind(),
        None => return ExecOutcome::Failed(StepError::not_found(format!("step {step_id} not found"))),
    };
    let _span = info_span!("step", run = %run.id, step = %step_id, executor = %kind).entered();

    match kind {
        ExecutorKind::Shell => shell_executor(run, step_id, ctx).await,
        ExecutorKind::Spawn => spawn_executor(run, step_id, ctx).await,
        ExecutorKind::Kill => kill_executor(run, step_id, ctx).await,
        ExecutorKind::Expand => expand_or_branch_executor(run, step_id),
        ExecutorKind::Branch => expand_or_branch_executor(run, step_id),
        ExecutorKind::Agent => agent_executor(run, step_id, ctx).await,
    }
}

async fn shell_executor(run: &Run, step_id: &StepId, ctx: &ExecutorContext) -> ExecOutcome {
    let config = match &run.steps[step_id].config {
        StepConfig::Shell(c) => c.clone(),
        _ => return ExecOutcome::Failed(StepError::validation("expected a shell config")),
    };
    let cwd = config
        .cwd
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));
    let cmd = ShellCommand {
        command: config.command.clone(),
        cwd,
        env: Vec::new(),
    };

    let result = meow_shell::run_cancellable(&cmd, ctx.cancel.cancelled()).await;
    match result {
        Ok(output) => outcome_from_shell(&config.capture, output),
        Err(e) => ExecOutcome::Failed(StepError::executor_failure(e.to_string())),
    }
}

fn outcome_from_shell(
    capture: &HashMap<String, meow_core::ShellCapture>,
    output: ShellOutput,
) -> ExecOutcome {
    let mut outputs = HashMap::new();
    outputs.insert("exit_code".to_string(), Value::from(output.exit_code));
    for (name, which) in capture {
        let captured = match which {
            meow_core::ShellCapture::Stdout => output.stdout.trim_end_matches('\n').to_string(),
            meow_core::ShellCapture::Stderr => output.stderr.trim_end_matches('\n').to_string(),
        };
        outputs.insert(name.clone(), Value::String(captured));
    }

    if output.exit_code == 0 {
        ExecOutcome::Done(outputs)
    } else {
        ExecOutcome::Failed(StepError::executor_failure(format!(
            "command exited with status {}",
            output.exit_code
        )))
    }
}

async fn spawn_executor(run: &mut Run, step_id: &StepId, ctx: &ExecutorContext) -> ExecOutcome {
    let config = match &run.steps[step_id].config {
        StepConfig::Spawn(c) => c.clone(),
        _ => return ExecOutcome::Failed(StepError::validation("expected a spawn config")),
    };
    let command = run.default_adapter.clone();
    match ctx.adapter.spawn(&config.agent, &config.workdir, &command).await {
        Ok(handle) => {
            let tmux_session = config
                .tmux_session
                .clone()
                .unwrap_or_else(|| handle.tmux_session.clone());
            let info = AgentInfo::new(tmux_session.clone(), config.workdir.clone());
            run.agents.insert(config.agent.clone(), info);
            ExecOutcome::Done(HashMap::from([(
                "tmux_session".to_string(),
                Value::String(tmux_session),
            )]))
        }
        Err(e) => ExecOutcome::Failed(StepError::executor_failure(e.to_string())),
    }
}

async fn kill_executor(run: &mut Run, step_id: &StepId, ctx: &ExecutorContext) -> ExecOutcome {
    let config = match &run.steps[step_id].config {
        StepConfig::Kill(c) => c.clone(),
        _ => return ExecOutcome::Failed(StepError::validation("expected a kill config")),
    };

    // Unknown or already-stopped agent is a no-op success (spec §4.5 edge case).
    let Some(info) = run.agents.get(&config.agent).cloned() else {
        return ExecOutcome::Done(HashMap::new());
    };

    match ctx.adapter.stop(&info.tmux_session, meow_shell::KILL_GRACE).await {
        Ok(()) => {
            run.agents.remove(&config.agent);
            ExecOutcome::Done(HashMap::new())
        }
        Err(e) => ExecOutcome::Failed(StepError::executor_failure(e.to_string())),
    }
}

async fn agent_executor(run: &mut Run, step_id: &StepId, ctx: &ExecutorContext) -> ExecOutcome {
    let config = match &run.steps[step_id].config {
        StepConfig::Agent(c) => c.clone(),
        _ => return ExecOutcome::Failed(StepError::validation("expected an agent config")),
    };

    let Some(info) = run.agents.get(&config.agent) else {
        return ExecOutcome::Failed(StepError::not_found(format!(
            "agent {} has no active session; spawn it first",
            config.agent
        )));
    };
    let session = info.tmux_session.clone();

    match ctx.adapter.prompt(&session, &config.prompt).await {
        Ok(()) => {
            if let Some(info) = run.agents.get_mut(&config.agent) {
                info.status = AgentStatus::Active;
                info.current_step = Some(step_id.clone());
            }
            ExecOutcome::Started
        }
        Err(e) => ExecOutcome::Failed(StepError::executor_failure(e.to_string())),
    }
}

/// `expand` and `branch` share the same mechanics (§9: the condition
/// language deciding which children apply is an external collaborator; by
/// the time this runs, `children` is already the resolved list).
fn expand_or_branch_executor(run: &mut Run, step_id: &StepId) -> ExecOutcome {
    let children = match &run.steps[step_id].config {
        StepConfig::Expand(c) => c.children.clone(),
        StepConfig::Branch(c) => c.children.clone(),
        _ => return ExecOutcome::Failed(StepError::validation("expected an expand/branch config")),
    };

    let mut inserted = Vec::with_capacity(children.len());
    for child in &children {
        let child_id = StepId::new(format!("{step_id}.{}", child.id_suffix));
        let mut needs = child.needs.clone();
        needs.insert(step_id.clone());
        let mut step = Step::new(child_id.clone(), child.config.clone(), needs);
        step.expanded_from = Some(step_id.clone());
        run.steps.insert(child_id.clone(), step);
        inserted.push(child_id);
    }

    if has_cycle(run) {
        for child_id in &inserted {
            run.steps.remove(child_id);
        }
        return ExecOutcome::Failed(StepError::validation(
            "expansion would introduce a dependency cycle",
        ));
    }

    inserted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    if let Some(parent) = run.steps.get_mut(step_id) {
        parent.expanded_into = inserted;
    }

    ExecOutcome::Done(HashMap::new())
}

/// Depth-first cycle detection over the `Needs` graph, re-checked after
/// expansion (invariant 2).
fn has_cycle(run: &Run) -> bool {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(id: &StepId, run: &Run, marks: &mut HashMap<StepId, Mark>) -> bool {
        match marks.get(id) {
            Some(Mark::Done) => return false,
            Some(Mark::Visiting) => return true,
            None => {}
        }
        marks.insert(id.clone(), Mark::Visiting);
        if let Some(step) = run.steps.get(id) {
            for dep in &step.needs {
                if visit(dep, run, marks) {
                    return true;
                }
            }
        }
        marks.insert(id.clone(), Mark::Done);
        false
    }

    let mut marks = HashMap::new();
    run.steps.keys().any(|id| visit(id, run, &mut marks))
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
