// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process counters for the engine.
//!
//! Dispatches are counted per agent with their failures broken down by
//! [`ErrorKind`]. Worker calls are counted per tool, with latencies bucketed
//! against the agent timeout classes so a report shows at a glance which
//! tools run close to their limits. The failure paths that never reach a
//! client (dropped events, malformed frames) get plain counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

use crate::error::ErrorKind;

/// Process-wide metrics.
pub static GLOBAL_METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

/// Upper bounds of the latency buckets, in milliseconds.
///
/// The last three line up with the decision, standard and generation
/// timeouts.
pub const LATENCY_BOUNDS_MS: [u64; 5] = [1_000, 10_000, 30_000, 60_000, 300_000];

#[derive(Debug)]
pub struct Metrics {
    dispatches: RwLock<BTreeMap<String, DispatchStats>>,
    workers: RwLock<BTreeMap<String, WorkerStats>>,
    dropped_events: AtomicU64,
    malformed_frames: AtomicU64,
    started: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            dispatches: RwLock::new(BTreeMap::new()),
            workers: RwLock::new(BTreeMap::new()),
            dropped_events: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Record one agent dispatch and how it failed, if it did.
    pub fn record_dispatch(&self, agent: &str, elapsed: Duration, failure: Option<ErrorKind>) {
        let mut dispatches = self.dispatches.write().unwrap_or_else(|e| e.into_inner());
        let stats = dispatches.entry(agent.to_string()).or_default();
        stats.dispatches += 1;
        stats.busy += elapsed;
        if let Some(kind) = failure {
            *stats.failures.entry(kind).or_insert(0) += 1;
        }
    }

    /// Record one call to a worker.
    pub fn record_invoke(&self, tool: &str, elapsed: Duration, ok: bool) {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        let stats = workers.entry(tool.to_string()).or_default();
        stats.calls += 1;
        if !ok {
            stats.failed += 1;
        }
        stats.latency.record(elapsed);
    }

    pub fn record_restart(&self, tool: &str) {
        let mut workers = self.workers.write().unwrap_or_else(|e| e.into_inner());
        workers.entry(tool.to_string()).or_default().restarts += 1;
    }

    pub fn record_dropped_events(&self, count: u64) {
        self.dropped_events.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_stats(&self, agent: &str) -> Option<DispatchStats> {
        self.dispatches
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(agent)
            .cloned()
    }

    pub fn worker_stats(&self, tool: &str) -> Option<WorkerStats> {
        self.workers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tool)
            .cloned()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatches: self.dispatches.read().unwrap_or_else(|e| e.into_inner()).clone(),
            workers: self.workers.read().unwrap_or_else(|e| e.into_inner()).clone(),
            dropped_events: self.dropped_events(),
            malformed_frames: self.malformed_frames(),
            uptime: self.started.elapsed(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Dispatch totals for one agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchStats {
    pub dispatches: u64,
    pub failures: BTreeMap<ErrorKind, u64>,
    /// Wall time spent inside dispatches.
    pub busy: Duration,
}

impl DispatchStats {
    pub fn failed(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn failures_of(&self, kind: ErrorKind) -> u64 {
        self.failures.get(&kind).copied().unwrap_or(0)
    }
}

/// Call totals for one worker tool, across every workspace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStats {
    pub calls: u64,
    pub failed: u64,
    pub restarts: u64,
    pub latency: LatencyBuckets,
}

/// Call counts per [`LATENCY_BOUNDS_MS`] bucket, plus one overflow bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyBuckets {
    counts: [u64; LATENCY_BOUNDS_MS.len() + 1],
}

impl LatencyBuckets {
    pub fn record(&mut self, elapsed: Duration) {
        let millis = elapsed.as_millis() as u64;
        let idx = LATENCY_BOUNDS_MS
            .iter()
            .position(|&bound| millis <= bound)
            .unwrap_or(LATENCY_BOUNDS_MS.len());
        self.counts[idx] += 1;
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Bound of the slowest non-empty bucket; `None` past the last bound.
    pub fn slowest(&self) -> Option<Option<Duration>> {
        let idx = self.counts.iter().rposition(|&c| c > 0)?;
        Some(LATENCY_BOUNDS_MS.get(idx).map(|&ms| Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub dispatches: BTreeMap<String, DispatchStats>,
    pub workers: BTreeMap<String, WorkerStats>,
    pub dropped_events: u64,
    pub malformed_frames: u64,
    pub uptime: Duration,
}

impl MetricsSnapshot {
    pub fn format_report(&self) -> String {
        let mut report = format!(
            "metrics after {:.1?}: {} dropped events, {} malformed frames\n",
            self.uptime, self.dropped_events, self.malformed_frames
        );

        for (agent, stats) in &self.dispatches {
            report.push_str(&format!(
                "  dispatch {}: {} runs, {:.1?} busy",
                agent, stats.dispatches, stats.busy
            ));
            if !stats.failures.is_empty() {
                let kinds: Vec<String> = stats
                    .failures
                    .iter()
                    .map(|(kind, n)| format!("{}={}", kind, n))
                    .collect();
                report.push_str(&format!(", failed {}", kinds.join(" ")));
            }
            report.push('\n');
        }

        for (tool, stats) in &self.workers {
            let slowest = match stats.latency.slowest() {
                Some(Some(bound)) => format!("<= {:?}", bound),
                Some(None) => "over every bound".to_string(),
                None => "-".to_string(),
            };
            report.push_str(&format!(
                "  worker {}: {} calls, {} failed, {} restarts, slowest {}\n",
                tool, stats.calls, stats.failed, stats.restarts, slowest
            ));
        }

        report
    }
}
