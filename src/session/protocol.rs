// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-facing session messages.
//!
//! Both directions are JSON objects discriminated by a `type` field, one
//! per line.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::context::SessionId;
use crate::error::SessionError;
use crate::events::{Phase, ProgressEvent};
use crate::workflow::{OutcomeStatus, WorkflowOutcome};

/// A message from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Bind the session to a workspace directory.
    Init {
        #[serde(rename = "workspacePath")]
        workspace_path: PathBuf,
    },
    /// Start one workflow for `content`.
    Message { content: String },
    /// Stop the running workflow after its current step.
    Cancel,
}

impl InboundMessage {
    pub fn parse(line: &str) -> Result<Self, SessionError> {
        serde_json::from_str(line).map_err(|e| SessionError::InvalidMessage(e.to_string()))
    }
}

/// A message to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Connected {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    Initialized {
        #[serde(rename = "workspacePath")]
        workspace_path: PathBuf,
    },
    Progress {
        agent: String,
        message: String,
        progress: f64,
    },
    AgentStart {
        agent: String,
    },
    AgentComplete {
        agent: String,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    Result {
        status: OutcomeStatus,
        content: String,
    },
    Error {
        message: String,
        code: String,
    },
}

impl OutboundEvent {
    pub fn error(err: &SessionError) -> Self {
        Self::Error {
            message: err.to_string(),
            code: err.code().to_string(),
        }
    }

    pub fn result(outcome: &WorkflowOutcome) -> Self {
        Self::Result {
            status: outcome.status,
            content: outcome.content.clone(),
        }
    }

    /// Serialize as one protocol line, newline included.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl From<&ProgressEvent> for OutboundEvent {
    fn from(event: &ProgressEvent) -> Self {
        match (event.phase, event.agent) {
            (Phase::Decision, Some(agent)) => Self::AgentStart {
                agent: agent.to_string(),
            },
            (Phase::Result, Some(agent)) => Self::AgentComplete {
                agent: agent.to_string(),
                duration_ms: event.duration_ms.unwrap_or(0),
            },
            _ => Self::Progress {
                agent: event.source().to_string(),
                message: event.message.clone(),
                progress: event.progress,
            },
        }
    }
}
