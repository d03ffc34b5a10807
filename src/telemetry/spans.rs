// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::{Duration, Instant};

use tracing::{info_span, Span};

use crate::error::ErrorKind;
use crate::workflow::AgentId;

/// Span covering one agent dispatch.
///
/// Opened by the router before the adapter runs and closed with the failure
/// kind, if any, so the `dispatch` span and the per-agent metrics agree.
pub struct AgentSpan {
    agent: AgentId,
    start: Instant,
    span: Span,
}

impl AgentSpan {
    pub fn start(agent: AgentId, iteration: u32) -> Self {
        let span = info_span!(
            "dispatch",
            agent = %agent,
            iteration,
            elapsed_ms = tracing::field::Empty,
            failure = tracing::field::Empty,
        );
        Self {
            agent,
            start: Instant::now(),
            span,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self, failure: Option<ErrorKind>) {
        let elapsed = self.start.elapsed();
        self.span.record("elapsed_ms", elapsed.as_millis() as u64);
        if let Some(kind) = failure {
            self.span.record("failure", tracing::field::display(kind));
        }

        #[cfg(feature = "telemetry")]
        super::metrics::GLOBAL_METRICS.record_dispatch(self.agent.as_str(), elapsed, failure);

        tracing::debug!(parent: &self.span, "Dispatch span closed");
    }
}
