// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session identifier type for tracking agent sessions.
//!
//! `SessionId` identifies an agent's underlying adapter session (e.g. a
//! tmux pane handle). This is distinct from `AgentId`, which identifies
//! the logical agent participant in a run. See [`crate::agent_info::AgentInfo`]
//! for where a session is attached to an agent.

crate::define_id! {
    /// Opaque handle to an agent's backing session, as managed by the
    /// Adapter collaborator (tmux session name, subprocess handle, etc.).
    pub struct SessionId;
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
