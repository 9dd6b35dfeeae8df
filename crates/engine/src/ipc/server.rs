// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-run IPC server (spec §4.2, §6): one `UnixListener` per run at
//! `<TMPDIR>/meow-<run-id>.sock`, line-delimited JSON in, one response line
//! out, connection then closed. Accept loop spawns one task per
//! connection, tracked in a [`tokio::task::JoinSet`] so shutdown can drain
//! in-flight workers before the socket file is removed.

use std::path::PathBuf;
use std::sync::Arc;

use meow_core::{Clock, RunId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::handlers;
use crate::ipc::protocol::{decode_request, encode_response, ProtocolError, Response};
use crate::state::RunHandle;

/// The rendezvous path for a run's IPC socket (spec §6).
pub fn socket_path_for(run_id: &RunId) -> PathBuf {
    std::env::temp_dir().join(format!("meow-{}.sock", run_id.as_str()))
}

/// A running server instance. Dropping this without calling [`Self::shutdown`]
/// leaves the accept task running — callers that own a server must shut it
/// down explicitly.
pub struct IpcHandle {
    socket_path: PathBuf,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: tokio::task::JoinHandle<()>,
}

impl IpcHandle {
    pub fn socket_path(&self) -> &std::path::Path {
        &self.socket_path
    }

    /// Signal the accept loop to stop, wait for in-flight connections to
    /// drain, then remove the socket file.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

/// Bind and start serving `run_id`'s socket, dispatching every request to
/// `handle` via [`crate::handlers::handle`]. Returns once the listener is
/// bound and accepting (spec §4.5 step 4: "wait until it is listening").
pub async fn start<C: Clock>(
    run_id: &RunId,
    handle: Arc<RunHandle<C>>,
) -> Result<IpcHandle, EngineError> {
    let socket_path = socket_path_for(run_id);
    if socket_path.exists() {
        let _ = tokio::fs::remove_file(&socket_path).await;
    }
    let listener = UnixListener::bind(&socket_path)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let path_for_task = socket_path.clone();
    let join = tokio::spawn(async move {
        serve(listener, handle, shutdown_rx).await;
        if let Err(e) = tokio::fs::remove_file(&path_for_task).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path_for_task.display(), "failed to remove ipc socket: {e}");
            }
        }
    });

    Ok(IpcHandle {
        socket_path,
        shutdown_tx: Some(shutdown_tx),
        join,
    })
}

/// Accept loop: spawns one task per connection into a `JoinSet`, stops
/// accepting when `shutdown` fires, then awaits the set so in-flight
/// workers finish before the caller removes the socket file.
async fn serve<C: Clock>(
    listener: UnixListener,
    handle: Arc<RunHandle<C>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut workers: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let handle = Arc::clone(&handle);
                        workers.spawn(async move {
                            if let Err(e) = handle_connection(stream, &handle).await {
                                match e {
                                    ProtocolError::ConnectionClosed => {
                                        debug!("ipc peer disconnected before sending a request");
                                    }
                                    other => warn!("ipc connection error: {other}"),
                                }
                            }
                        });
                    }
                    Err(e) => warn!("ipc accept error: {e}"),
                }
            }
        }
    }

    drop(listener);
    while workers.join_next().await.is_some() {}
}

/// Read exactly one request line, dispatch it, write exactly one response
/// line, then let the connection close. Malformed input never panics or
/// hangs the worker — it yields a `Response::Error` line instead.
async fn handle_connection<C: Clock>(
    stream: UnixStream,
    handle: &RunHandle<C>,
) -> Result<(), ProtocolError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }

    let response = match decode_request(line.trim_end()) {
        Ok(request) => handlers::handle(handle, request).await,
        Err(e) => Response::error(format!("malformed request: {e}")),
    };

    let mut encoded = encode_response(&response)?;
    encoded.push('\n');
    writer.write_all(encoded.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
