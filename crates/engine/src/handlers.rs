// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One function per `Request` variant (spec §4.4). Each takes the
//! [`RunHandle`], takes the run lock, mutates, persists, and releases.

use crate::duration_fmt::parse_duration;
use crate::ipc::protocol::{Request, Response};
use crate::state::RunHandle;
use crate::validation::validate;
use meow_core::{AgentId, Clock, Event, StepConfig, StepId, StepStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn handle<C: Clock>(handle: &RunHandle<C>, request: Request) -> Response {
    match request {
        Request::StepStart {
            workflow,
            agent,
            step,
        } => step_start(handle, &workflow, &agent, &step).await,
        Request::StepDone {
            workflow,
            agent,
            step,
            outputs,
            notes,
        } => step_done(handle, &workflow, &agent, &step, outputs, notes).await,
        Request::GetSessionId { workflow, agent } => get_session_id(handle, &workflow, &agent).await,
        Request::Event {
            workflow,
            agent,
            event_type,
            data,
        } => event(handle, &workflow, &agent, event_type, data).await,
        Request::AwaitEvent {
            workflow,
            event_type,
            filter,
            timeout,
        } => await_event(handle, &workflow, event_type, filter, timeout).await,
        Request::GetStepStatus { workflow, step } => get_step_status(handle, &workflow, &step).await,
    }
}

fn check_workflow(run_id: &meow_core::RunId, workflow: &str) -> Option<Response> {
    if run_id.as_str() == workflow {
        None
    } else {
        Some(Response::error(format!(
            "unknown workflow: {workflow} (this server hosts {run_id})"
        )))
    }
}

async fn step_start<C: Clock>(
    handle: &RunHandle<C>,
    workflow: &str,
    agent: &str,
    step: &str,
) -> Response {
    let run = handle.lock().await;
    if let Some(err) = check_workflow(&run.id, workflow) {
        return err;
    }
    info!(agent, step, "agent acknowledged prompt receipt");
    Response::ack()
}

async fn step_done<C: Clock>(
    handle: &RunHandle<C>,
    workflow: &str,
    agent: &str,
    step: &str,
    outputs: HashMap<String, serde_json::Value>,
    notes: Option<String>,
) -> Response {
    let mut run = handle.lock().await;
    if let Some(err) = check_workflow(&run.id, workflow) {
        return err;
    }

    let step_id = StepId::new(step);
    let Some(existing) = run.steps.get(&step_id) else {
        return Response::error(format!("no such step: {step}"));
    };
    if existing.status != StepStatus::Running {
        return Response::error(format!("step {step} is not running"));
    }

    let output_specs = match &existing.config {
        StepConfig::Agent(cfg) => cfg.outputs.clone(),
        _ => HashMap::new(),
    };
    let workdir = run
        .agents
        .get(&AgentId::new(agent))
        .map(|info| info.workdir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let validated = match validate(&output_specs, &outputs, &workdir, handle.checker()) {
        Ok(validated) => validated,
        Err(e) => {
            warn!(step, agent, "step_done validation failed: {e}");
            return Response::error(e.to_string());
        }
    };

    if let Some(step) = run.steps.get_mut(&step_id) {
        step.status = StepStatus::Completing;
        step.outputs = validated;
        if let Some(notes) = notes {
            step.outputs.insert("notes".to_string(), serde_json::Value::String(notes));
        }
    }

    if let Err(e) = handle.persist(&run).await {
        warn!(step = %step_id, "failed to persist step_done transition: {e}");
        return Response::error(e.to_string());
    }

    handle.notify_completion(step_id);
    Response::ack()
}

async fn get_session_id<C: Clock>(handle: &RunHandle<C>, workflow: &str, agent: &str) -> Response {
    let run = handle.lock().await;
    if let Some(err) = check_workflow(&run.id, workflow) {
        return err;
    }
    match run.agents.get(&AgentId::new(agent)) {
        Some(info) => Response::SessionId {
            session_id: info.session_id.as_ref().map(|s| s.as_str().to_string()),
        },
        None => Response::error(format!("no such agent: {agent}")),
    }
}

async fn event<C: Clock>(
    handle: &RunHandle<C>,
    workflow: &str,
    agent: &str,
    event_type: String,
    data: HashMap<String, serde_json::Value>,
) -> Response {
    let run = handle.lock().await;
    if let Some(err) = check_workflow(&run.id, workflow) {
        return err;
    }
    let stamped = Event {
        event_type,
        data,
        agent: AgentId::new(agent),
        run: run.id.clone(),
        timestamp: handle.clock().epoch_ms(),
    };
    drop(run);
    handle.events().publish(stamped);
    Response::ack()
}

async fn await_event<C: Clock>(
    handle: &RunHandle<C>,
    workflow: &str,
    event_type: String,
    filter: HashMap<String, serde_json::Value>,
    timeout: Option<String>,
) -> Response {
    {
        let run = handle.lock().await;
        if let Some(err) = check_workflow(&run.id, workflow) {
            return err;
        }
    }

    let Some(timeout) = timeout.as_deref().and_then(parse_duration) else {
        return Response::error("await_event requires a valid timeout");
    };

    match handle.events().subscribe(event_type, filter, timeout).await {
        Ok(event) => Response::EventMatch {
            event_type: event.event_type,
            data: event.data,
            agent: event.agent.as_str().to_string(),
            timestamp: event.timestamp,
        },
        Err(e) => Response::error(format!("await_event: {e}")),
    }
}

async fn get_step_status<C: Clock>(handle: &RunHandle<C>, workflow: &str, step: &str) -> Response {
    let run = handle.lock().await;
    if let Some(err) = check_workflow(&run.id, workflow) {
        return err;
    }
    match run.steps.get(&StepId::new(step)) {
        Some(s) => Response::StepStatus {
            status: s.status.to_string(),
        },
        None => Response::error(format!("no such step: {step}")),
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
