use super::*;
use meow_core::{FakeClock, Run, RunId, ShellConfig, Step, StepConfig, StepId, StepStatus};
use meow_store::RunStore;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

async fn test_handle(run_id: &str) -> (Arc<RunHandle<FakeClock>>, RunId) {
    let id = RunId::new(run_id);
    let mut run = Run::new(id.clone(), PathBuf::from("t.yaml"), "claude");
    run.steps.insert(
        StepId::new("s1"),
        Step {
            status: StepStatus::Running,
            ..Step::new(
                StepId::new("s1"),
                StepConfig::Shell(ShellConfig {
                    command: "true".to_string(),
                    cwd: None,
                    capture: HashMap::new(),
                }),
                BTreeSet::new(),
            )
        },
    );

    let dir = tempdir().unwrap();
    let store = RunStore::open(dir.path()).unwrap();
    store.save(&run).unwrap();

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = Arc::new(RunHandle::new(run, store, FakeClock::new(), tx, None));
    // Leak the tempdir for the lifetime of the test; it's removed when the
    // process exits, and the test only needs the store file to outlive the
    // server task.
    std::mem::forget(dir);
    (handle, id)
}

async fn roundtrip(socket_path: &std::path::Path, request: serde_json::Value) -> serde_json::Value {
    let stream = tokio::net::UnixStream::connect(socket_path).await.unwrap();
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
async fn round_trips_a_get_step_status_request_over_the_socket() {
    let (handle, run_id) = test_handle("run-ipc-1").await;
    let ipc = start(&run_id, Arc::clone(&handle)).await.unwrap();

    let response = roundtrip(
        ipc.socket_path(),
        json!({"type": "get_step_status", "workflow": run_id.as_str(), "step": "s1"}),
    )
    .await;

    assert_eq!(response, json!({"type": "step_status", "status": "running"}));
    ipc.shutdown().await;
    assert!(!ipc_socket_path_still_exists(&run_id));
}

fn ipc_socket_path_still_exists(run_id: &RunId) -> bool {
    socket_path_for(run_id).exists()
}

#[tokio::test]
async fn an_unknown_request_type_yields_an_error_response_without_crashing_the_worker() {
    let (handle, run_id) = test_handle("run-ipc-2").await;
    let ipc = start(&run_id, Arc::clone(&handle)).await.unwrap();

    let response = roundtrip(ipc.socket_path(), json!({"type": "not_a_real_request"})).await;
    assert_eq!(response["type"], "error");

    // The listener is still alive for a subsequent, well-formed request.
    let response = roundtrip(
        ipc.socket_path(),
        json!({"type": "get_step_status", "workflow": run_id.as_str(), "step": "s1"}),
    )
    .await;
    assert_eq!(response["type"], "step_status");

    ipc.shutdown().await;
}

#[tokio::test]
async fn a_request_for_the_wrong_workflow_is_rejected() {
    let (handle, run_id) = test_handle("run-ipc-3").await;
    let ipc = start(&run_id, Arc::clone(&handle)).await.unwrap();

    let response = roundtrip(
        ipc.socket_path(),
        json!({"type": "get_step_status", "workflow": "some-other-run", "step": "s1"}),
    )
    .await;

    assert_eq!(response["type"], "error");
    ipc.shutdown().await;
}

#[tokio::test]
async fn shutdown_removes_the_socket_file_and_stops_accepting() {
    let (handle, run_id) = test_handle("run-ipc-4").await;
    let ipc = start(&run_id, Arc::clone(&handle)).await.unwrap();
    let socket_path = ipc.socket_path().to_path_buf();
    assert!(socket_path.exists());

    ipc.shutdown().await;

    assert!(!socket_path.exists());
    assert!(tokio::net::UnixStream::connect(&socket_path).await.is_err());
}

#[tokio::test]
async fn start_removes_a_stale_socket_left_behind_by_a_prior_crash() {
    let (handle, run_id) = test_handle("run-ipc-5").await;
    let socket_path = socket_path_for(&run_id);
    // Simulate a leftover socket file from a process that crashed without
    // cleaning up.
    let _ = tokio::net::UnixListener::bind(&socket_path).unwrap();
    assert!(socket_path.exists());

    let ipc = start(&run_id, handle).await.unwrap();
    let response = roundtrip(
        ipc.socket_path(),
        json!({"type": "get_step_status", "workflow": run_id.as_str(), "step": "s1"}),
    )
    .await;
    assert_eq!(response["type"], "step_status");

    ipc.shutdown().await;
}
