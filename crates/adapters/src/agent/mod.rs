// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Adapter collaborator contract (spec §6): spawn-on-command, prompt
//! injection, and graceful stop for an agent. Narrower than a full
//! terminal-output-watching agent adapter — the orchestrator core learns
//! of step completion over IPC, not by parsing session output.

use async_trait::async_trait;
use meow_core::AgentId;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::session::{SessionAdapter, SessionError};

#[derive(Debug, Error)]
pub enum AgentAdapterError {
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

/// A live agent session, as reported back to the `spawn` executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHandle {
    pub tmux_session: String,
    pub workdir: PathBuf,
}

/// Spawn, prompt, and stop an agent. Implemented in terms of a
/// [`SessionAdapter`] so any concrete session backend (tmux, a bare
/// subprocess, a fake for tests) can host an agent.
#[async_trait]
pub trait AgentAdapter: Send + Sync + 'static {
    async fn spawn(
        &self,
        agent: &AgentId,
        cwd: &Path,
        command: &str,
    ) -> Result<AgentHandle, AgentAdapterError>;

    /// Deliver a prompt into the agent's live session.
    async fn prompt(&self, session: &str, text: &str) -> Result<(), AgentAdapterError>;

    /// Cooperative stop: send a signal, wait up to `grace`, then force-kill.
    async fn stop(&self, session: &str, grace: Duration) -> Result<(), AgentAdapterError>;
}

/// [`AgentAdapter`] backed by any [`SessionAdapter`] (tmux in production,
/// a fake in tests).
pub struct SessionBackedAgentAdapter<S: SessionAdapter> {
    sessions: S,
}

impl<S: SessionAdapter> SessionBackedAgentAdapter<S> {
    pub fn new(sessions: S) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl<S: SessionAdapter> AgentAdapter for SessionBackedAgentAdapter<S> {
    async fn spawn(
        &self,
        agent: &AgentId,
        cwd: &Path,
        command: &str,
    ) -> Result<AgentHandle, AgentAdapterError> {
        let tmux_session = self.sessions.spawn(agent.as_str(), cwd, command, &[]).await?;
        Ok(AgentHandle {
            tmux_session,
            workdir: cwd.to_path_buf(),
        })
    }

    async fn prompt(&self, session: &str, text: &str) -> Result<(), AgentAdapterError> {
        self.sessions.send_literal(session, text).await?;
        self.sessions.send_enter(session).await?;
        Ok(())
    }

    async fn stop(&self, session: &str, grace: Duration) -> Result<(), AgentAdapterError> {
        // Cooperative signal: Ctrl-C before the hard kill.
        self.sessions.send(session, "C-c").await.ok();
        tokio::time::sleep(grace).await;
        if self.sessions.is_alive(session).await.unwrap_or(false) {
            self.sessions.kill(session).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
