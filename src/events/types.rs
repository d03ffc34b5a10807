// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress events published during a workflow run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::SessionId;
use crate::rpc::normalize_progress;
use crate::workflow::AgentId;

/// Stage of work an event reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// The supervisor is choosing the next step.
    Think,
    /// A worker reported intermediate progress.
    Progress,
    /// The supervisor chose an agent; dispatch is about to start.
    Decision,
    /// A dispatch finished.
    Result,
}

/// One progress update, always scoped to a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub session_id: SessionId,
    /// `None` when the event comes from the supervisor itself.
    pub agent: Option<AgentId>,
    pub phase: Phase,
    pub message: String,
    /// Completion fraction in `0..=1`.
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProgressEvent {
    pub fn new(
        session_id: SessionId,
        agent: Option<AgentId>,
        phase: Phase,
        message: impl Into<String>,
        progress: f64,
    ) -> Self {
        Self {
            session_id,
            agent,
            phase,
            message: message.into(),
            progress: normalize_progress(progress, None),
            timestamp: Utc::now(),
            duration_ms: None,
            data: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Display name of the emitter.
    pub fn source(&self) -> &'static str {
        self.agent.map(|a| a.as_str()).unwrap_or("supervisor")
    }
}
