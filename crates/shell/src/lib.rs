// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The `shell` executor's Executor collaborator: runs one command as a
//! black box and reports its stdout, stderr, and exit code. Parsing or
//! interpreting the command itself is out of scope — it is handed
//! verbatim to `bash -c`.

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn command: {0}")]
    Spawn(std::io::Error),
    #[error("failed to wait for command: {0}")]
    Wait(std::io::Error),
}

/// A command to run, grounded in the same `bash -c` + `set -euo pipefail`
/// wrapping the orchestrator engine already uses for its own effects.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    pub command: String,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Grace period between SIGTERM and SIGKILL for a cancelled command (spec §5).
pub const KILL_GRACE: Duration = Duration::from_secs(3);

/// Run `cmd` to completion with no cancellation support.
pub async fn run(cmd: &ShellCommand) -> Result<ShellOutput, ShellError> {
    let mut child = spawn(cmd)?;
    let output = child.wait_with_output().await.map_err(ShellError::Wait)?;
    Ok(to_shell_output(output))
}

/// Run `cmd`, racing it against `cancelled`. If `cancelled` resolves
/// before the command exits, the command's process group is sent
/// SIGTERM; if it hasn't exited within [`KILL_GRACE`], SIGKILL follows.
///
/// `Child::wait_with_output` takes `self` by value, which doesn't fit a
/// `select!` that may need to wait on the same child more than once (the
/// cancellation branch waits again after sending SIGTERM). Take the piped
/// stdout/stderr handles up front and drain them on their own tasks so the
/// pipe buffers never fill while we repeatedly `&mut`-borrow `child.wait()`.
pub async fn run_cancellable<F>(cmd: &ShellCommand, cancelled: F) -> Result<ShellOutput, ShellError>
where
    F: std::future::Future<Output = ()>,
{
    let mut child = spawn(cmd)?;
    let pid = child.id();
    let stdout_task = drain(child.stdout.take());
    let stderr_task = drain(child.stderr.take());

    tokio::select! {
        result = child.wait() => {
            let status = result.map_err(ShellError::Wait)?;
            finish(status, stdout_task, stderr_task).await
        }
        () = cancelled => {
            if let Some(pid) = pid {
                let pgid = Pid::from_raw(pid as i32);
                let _ = killpg(pgid, Signal::SIGTERM);

                tokio::select! {
                    result = child.wait() => {
                        let status = result.map_err(ShellError::Wait)?;
                        return finish(status, stdout_task, stderr_task).await;
                    }
                    () = tokio::time::sleep(KILL_GRACE) => {
                        let _ = killpg(pgid, Signal::SIGKILL);
                    }
                }
            }
            let status = child.wait().await.map_err(ShellError::Wait)?;
            finish(status, stdout_task, stderr_task).await
        }
    }
}

/// Spawn a task draining `pipe` to completion, so a long-running command's
/// output never backs up behind a `child.wait()` that's raced against
/// cancellation more than once.
fn drain(pipe: Option<impl tokio::io::AsyncRead + Unpin + Send + 'static>) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn finish(
    status: ExitStatus,
    stdout_task: JoinHandle<Vec<u8>>,
    stderr_task: JoinHandle<Vec<u8>>,
) -> Result<ShellOutput, ShellError> {
    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();
    Ok(ShellOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code().unwrap_or(-1),
    })
}

fn spawn(cmd: &ShellCommand) -> Result<tokio::process::Child, ShellError> {
    let wrapped = format!("set -euo pipefail\n{}", cmd.command);
    Command::new("bash")
        .arg("-c")
        .arg(&wrapped)
        .current_dir(&cmd.cwd)
        .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .process_group(0)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(ShellError::Spawn)
}

fn to_shell_output(output: std::process::Output) -> ShellOutput {
    ShellOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
