use super::*;
use meow_adapters::{AgentAdapter, FakeSessionAdapter, SessionBackedAgentAdapter};
use meow_core::{
    AgentConfig, AgentId, AgentInfo, FakeClock, OutputSpec, OutputType, Run, RunId, ShellConfig,
    Step, StepConfig, StepId, StepStatus,
};
use meow_store::RunStore;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

fn adapter() -> Arc<dyn AgentAdapter> {
    Arc::new(SessionBackedAgentAdapter::new(FakeSessionAdapter::new()))
}

async fn attach(run: Run, config: EngineConfig) -> (Engine<FakeClock>, RunStore, TempDir) {
    let dir = tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();
    store.save(&run).unwrap();
    let engine = Engine::attach(&run.id, store.clone(), FakeClock::new(), adapter(), None, config)
        .await
        .unwrap();
    (engine, store, dir)
}

#[tokio::test]
async fn single_shell_step_run_completes_done() {
    let mut run = Run::new(RunId::new("run-shell"), PathBuf::from("t.yaml"), "claude");
    run.steps.insert(
        StepId::new("s1"),
        Step::new(
            StepId::new("s1"),
            StepConfig::Shell(ShellConfig {
                command: "true".to_string(),
                cwd: None,
                capture: HashMap::new(),
            }),
            BTreeSet::new(),
        ),
    );
    let (engine, store, _dir) = attach(run, EngineConfig::default()).await;
    let run_id = RunId::new("run-shell");

    let status = engine.run().await.unwrap();

    assert_eq!(status, RunStatus::Done);
    let persisted = store.get(&run_id).unwrap();
    assert_eq!(persisted.status, RunStatus::Done);
    assert_eq!(persisted.steps[&StepId::new("s1")].status, StepStatus::Done);
}

#[tokio::test]
async fn attach_resets_crashed_orchestrator_step_to_pending_but_leaves_agent_steps_running() {
    let mut run = Run::new(RunId::new("run-crash"), PathBuf::from("t.yaml"), "claude");
    run.status = RunStatus::Running;
    run.orchestrator_pid = 999_999;
    run.steps.insert(
        StepId::new("shell-crashed"),
        Step {
            status: StepStatus::Running,
            started_at: Some(10),
            ..Step::new(
                StepId::new("shell-crashed"),
                StepConfig::Shell(ShellConfig {
                    command: "true".to_string(),
                    cwd: None,
                    capture: HashMap::new(),
                }),
                BTreeSet::new(),
            )
        },
    );
    run.agents.insert(
        AgentId::new("w1"),
        AgentInfo::new("sess-1", std::env::temp_dir()),
    );
    run.steps.insert(
        StepId::new("agent-still-running"),
        Step {
            status: StepStatus::Running,
            started_at: Some(10),
            ..Step::new(
                StepId::new("agent-still-running"),
                StepConfig::Agent(AgentConfig {
                    agent: AgentId::new("w1"),
                    prompt: "do X".to_string(),
                    outputs: HashMap::new(),
                    timeout: None,
                }),
                BTreeSet::new(),
            )
        },
    );

    let (engine, _store, _dir) = attach(run, EngineConfig::default()).await;
    let snapshot = engine.snapshot().await;

    assert_eq!(
        snapshot.steps[&StepId::new("shell-crashed")].status,
        StepStatus::Pending,
        "orchestrator-executor steps left running by a crash are retried"
    );
    assert_eq!(
        snapshot.steps[&StepId::new("agent-still-running")].status,
        StepStatus::Running,
        "an agent step may still be genuinely in flight; the Engine doesn't second-guess it"
    );
    assert_eq!(snapshot.status, RunStatus::Running);
    assert_eq!(snapshot.orchestrator_pid, std::process::id());
}

#[tokio::test]
async fn attach_refuses_an_already_terminal_run() {
    let mut run = Run::new(RunId::new("run-done"), PathBuf::from("t.yaml"), "claude");
    run.status = RunStatus::Done;
    let dir = tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();
    store.save(&run).unwrap();

    let result = Engine::attach(
        &run.id,
        store,
        FakeClock::new(),
        adapter(),
        None,
        EngineConfig::default(),
    )
    .await;

    assert!(matches!(result, Err(EngineError::AlreadyTerminal(_))));
}

#[tokio::test]
async fn agent_step_completes_via_ipc_step_done() {
    let mut run = Run::new(RunId::new("run-agent"), PathBuf::from("t.yaml"), "claude");
    run.agents.insert(
        AgentId::new("w1"),
        AgentInfo::new("sess-1", std::env::temp_dir()),
    );
    run.steps.insert(
        StepId::new("a1"),
        Step::new(
            StepId::new("a1"),
            StepConfig::Agent(AgentConfig {
                agent: AgentId::new("w1"),
                prompt: "summarize".to_string(),
                outputs: HashMap::from([(
                    "summary".to_string(),
                    OutputSpec {
                        required: true,
                        output_type: OutputType::String,
                        description: None,
                    },
                )]),
                timeout: None,
            }),
            BTreeSet::new(),
        ),
    );
    let run_id = run.id.clone();
    let config = EngineConfig {
        watchdog_interval: std::time::Duration::from_millis(20),
        ..EngineConfig::default()
    };
    let (engine, store, _dir) = attach(run, config).await;

    let handle = tokio::spawn(engine.run());

    // The agent step is dispatched asynchronously; retry the step_done
    // request until the step has actually reached `running`.
    let socket_path = ipc::server::socket_path_for(&run_id);
    let mut response = None;
    for _ in 0..100 {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if !socket_path.exists() {
            continue;
        }
        let Ok(stream) = UnixStream::connect(&socket_path).await else {
            continue;
        };
        let resp = send_request(
            stream,
            json!({
                "type": "step_done",
                "workflow": run_id.as_str(),
                "agent": "w1",
                "step": "a1",
                "outputs": {"summary": "ok"},
            }),
        )
        .await;
        if resp["type"] == "ack" {
            response = Some(resp);
            break;
        }
    }
    let response = response.expect("step_done eventually succeeds once the step is running");
    assert_eq!(response["type"], "ack");

    let status = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("engine run task finished")
        .expect("engine task didn't panic")
        .expect("engine run succeeded");
    assert_eq!(status, RunStatus::Done);

    let persisted = store.get(&run_id).unwrap();
    assert_eq!(
        persisted.steps[&StepId::new("a1")].outputs.get("summary"),
        Some(&json!("ok"))
    );
}

async fn send_request(stream: UnixStream, request: serde_json::Value) -> serde_json::Value {
    let (reader, mut writer) = stream.into_split();
    let mut line = serde_json::to_string(&request).unwrap();
    line.push('\n');
    writer.write_all(line.as_bytes()).await.unwrap();
    writer.flush().await.unwrap();

    let mut reader = BufReader::new(reader);
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await.unwrap();
    serde_json::from_str(response_line.trim_end()).unwrap()
}

#[tokio::test]
async fn cancelling_before_any_dispatch_stops_the_run_and_runs_the_stop_script() {
    let dir = tempdir().unwrap();
    let marker = dir.path().join("stopped-marker");
    let mut run = Run::new(RunId::new("run-stop"), PathBuf::from("t.yaml"), "claude");
    run.template = dir.path().join("t.yaml");
    run.cleanup.on_stop = Some(format!("touch {}", marker.display()));
    run.steps.insert(
        StepId::new("never-dispatched"),
        Step::new(
            StepId::new("never-dispatched"),
            StepConfig::Shell(ShellConfig {
                command: "true".to_string(),
                cwd: None,
                capture: HashMap::new(),
            }),
            BTreeSet::new(),
        ),
    );

    let store = RunStore::open(dir.path()).unwrap();
    store.save(&run).unwrap();
    let engine = Engine::attach(
        &run.id,
        store.clone(),
        FakeClock::new(),
        adapter(),
        None,
        EngineConfig::default(),
    )
    .await
    .unwrap();

    let cancel = engine.cancel_token();
    cancel.cancel();

    let status = engine.run().await.unwrap();

    assert_eq!(status, RunStatus::Stopped);
    assert!(marker.exists(), "on_stop cleanup script should have run");
    let persisted = store.get(&run.id).unwrap();
    assert_eq!(persisted.status, RunStatus::Stopped);
    assert_eq!(
        persisted.steps[&StepId::new("never-dispatched")].status,
        StepStatus::Pending
    );
}

#[tokio::test]
async fn a_run_with_an_unreachable_dependency_fails_as_no_progress() {
    let mut run = Run::new(RunId::new("run-stuck"), PathBuf::from("t.yaml"), "claude");
    run.steps.insert(
        StepId::new("stuck"),
        Step::new(
            StepId::new("stuck"),
            StepConfig::Shell(ShellConfig {
                command: "true".to_string(),
                cwd: None,
                capture: HashMap::new(),
            }),
            BTreeSet::from([StepId::new("never-exists")]),
        ),
    );

    let config = EngineConfig {
        watchdog_interval: std::time::Duration::from_millis(10),
        ..EngineConfig::default()
    };
    let (engine, store, _dir) = attach(run, config).await;
    let run_id = RunId::new("run-stuck");

    let status = tokio::time::timeout(std::time::Duration::from_secs(5), engine.run())
        .await
        .expect("engine loop terminates instead of hanging")
        .unwrap();

    assert_eq!(status, RunStatus::Failed);
    let persisted = store.get(&run_id).unwrap();
    assert_eq!(persisted.status, RunStatus::Failed);
    assert_eq!(
        persisted.steps[&StepId::new("stuck")].status,
        StepStatus::Pending,
        "the stuck step itself is never touched; the run just gives up waiting on it"
    );
}

#[tokio::test]
async fn a_pending_step_behind_a_running_agent_step_is_not_a_no_progress_failure() {
    let mut run = Run::new(RunId::new("run-inflight"), PathBuf::from("t.yaml"), "claude");
    run.agents.insert(
        AgentId::new("w1"),
        AgentInfo::new("sess-1", std::env::temp_dir()),
    );
    run.steps.insert(
        StepId::new("agent-step"),
        Step {
            status: StepStatus::Running,
            started_at: Some(0),
            ..Step::new(
                StepId::new("agent-step"),
                StepConfig::Agent(AgentConfig {
                    agent: AgentId::new("w1"),
                    prompt: "do X".to_string(),
                    outputs: HashMap::new(),
                    timeout: None,
                }),
                BTreeSet::new(),
            )
        },
    );
    run.steps.insert(
        StepId::new("downstream"),
        Step::new(
            StepId::new("downstream"),
            StepConfig::Shell(ShellConfig {
                command: "true".to_string(),
                cwd: None,
                capture: HashMap::new(),
            }),
            BTreeSet::from([StepId::new("agent-step")]),
        ),
    );

    let config = EngineConfig {
        watchdog_interval: std::time::Duration::from_millis(10),
        ..EngineConfig::default()
    };
    let (engine, store, _dir) = attach(run, config).await;
    let run_id = RunId::new("run-inflight");
    let cancel = engine.cancel_token();

    let run_fut = engine.run();
    // Well past the old two-tick no-progress threshold (~20ms); the run
    // must still be waiting on the agent's step_done, not failed outright.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();
    let status = tokio::time::timeout(std::time::Duration::from_secs(5), run_fut)
        .await
        .expect("engine loop terminates instead of hanging")
        .unwrap();

    assert_eq!(
        status,
        RunStatus::Stopped,
        "a live agent step must not be mistaken for a stalled run"
    );
    let persisted = store.get(&run_id).unwrap();
    assert_eq!(
        persisted.steps[&StepId::new("agent-step")].status,
        StepStatus::Running,
        "cleanup kills the agent but doesn't touch the step's own status"
    );
}

#[tokio::test]
async fn dispatch_respects_one_in_flight_step_per_agent() {
    let mut run = Run::new(RunId::new("run-fanout"), PathBuf::from("t.yaml"), "claude");
    run.agents.insert(
        AgentId::new("w1"),
        AgentInfo::new("sess-1", std::env::temp_dir()),
    );
    for id in ["a1", "a2"] {
        run.steps.insert(
            StepId::new(id),
            Step::new(
                StepId::new(id),
                StepConfig::Agent(AgentConfig {
                    agent: AgentId::new("w1"),
                    prompt: format!("prompt for {id}"),
                    outputs: HashMap::new(),
                    timeout: None,
                }),
                BTreeSet::new(),
            ),
        );
    }

    let (mut engine, _store, _dir) = attach(run, EngineConfig::default()).await;
    let dispatched = engine.dispatch_ready_steps().await.unwrap();
    assert!(dispatched);

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.steps[&StepId::new("a1")].status, StepStatus::Running);
    assert_eq!(
        snapshot.steps[&StepId::new("a2")].status,
        StepStatus::Pending,
        "a2 is bound to the same agent as the already-dispatched a1"
    );
}

#[tokio::test]
async fn fail_timed_out_agents_marks_an_overdue_agent_step_failed() {
    let mut run = Run::new(RunId::new("run-timeout"), PathBuf::from("t.yaml"), "claude");
    run.agents.insert(
        AgentId::new("w1"),
        AgentInfo::new("sess-1", std::env::temp_dir()),
    );
    run.steps.insert(
        StepId::new("a1"),
        Step {
            status: StepStatus::Running,
            started_at: Some(0),
            ..Step::new(
                StepId::new("a1"),
                StepConfig::Agent(AgentConfig {
                    agent: AgentId::new("w1"),
                    prompt: "do X".to_string(),
                    outputs: HashMap::new(),
                    timeout: Some("100ms".to_string()),
                }),
                BTreeSet::new(),
            )
        },
    );

    let (mut engine, _store, _dir) = attach(run, EngineConfig::default()).await;
    engine.clock.advance_ms(150);

    let any_timed_out = engine.fail_timed_out_agents().await.unwrap();
    assert!(any_timed_out);

    let snapshot = engine.snapshot().await;
    let step = &snapshot.steps[&StepId::new("a1")];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(
        step.error.as_ref().unwrap().kind,
        meow_core::StepErrorKind::CancelledOrTimedOut
    );
}
