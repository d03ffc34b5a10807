// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry, tracing, and metrics infrastructure.
//!
//! - **Tracing**: structured logging to stderr with a span per dispatch
//! - **Metrics**: per-agent dispatch failures by kind, per-tool call
//!   latencies and restarts, and counters for dropped events and malformed
//!   frames
//!
//! Session correlation lives in [`crate::context`]; every log line emitted
//! inside a workflow run carries the session id through the run span.
//!
//! # Usage
//!
//! ```rust,ignore
//! use conductor::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_verbosity(1))?;
//! ```
//!
//! Stdout is reserved for protocol frames when serving, so logs always go
//! to stderr.

mod init;
pub mod metrics;
mod spans;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    DispatchStats, LatencyBuckets, Metrics, MetricsSnapshot, WorkerStats, GLOBAL_METRICS,
    LATENCY_BOUNDS_MS,
};
pub use spans::AgentSpan;
