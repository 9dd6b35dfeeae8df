// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the per-run IPC protocol (spec §4.2, §6). Tagged on
//! `type`, one JSON object per line — not the teacher's 4-byte
//! length-prefix framing, since spec §6 is explicit about line framing.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    StepStart {
        workflow: String,
        agent: String,
        step: String,
    },
    StepDone {
        workflow: String,
        agent: String,
        step: String,
        #[serde(default)]
        outputs: HashMap<String, Value>,
        #[serde(default)]
        notes: Option<String>,
    },
    GetSessionId {
        workflow: String,
        agent: String,
    },
    Event {
        workflow: String,
        agent: String,
        event_type: String,
        #[serde(default)]
        data: HashMap<String, Value>,
    },
    AwaitEvent {
        workflow: String,
        event_type: String,
        #[serde(default)]
        filter: HashMap<String, Value>,
        #[serde(default)]
        timeout: Option<String>,
    },
    GetStepStatus {
        workflow: String,
        step: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ack {
        success: bool,
    },
    Error {
        message: String,
    },
    SessionId {
        session_id: Option<String>,
    },
    EventMatch {
        event_type: String,
        data: HashMap<String, Value>,
        agent: String,
        timestamp: u64,
    },
    StepStatus {
        status: String,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn ack() -> Self {
        Response::Ack { success: true }
    }
}

/// Decode a single line as a `Request`.
pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    Ok(serde_json::from_str(line)?)
}

/// Encode a `Response` as a single line (no embedded newline), ready to be
/// written with a trailing `\n`.
pub fn encode_response(response: &Response) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(response)?)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
