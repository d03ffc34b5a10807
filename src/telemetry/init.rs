// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Subscriber setup for the `conductor` binary.
//!
//! Stdout carries session frames, so logs always go to stderr. The engine's
//! own targets follow `-v`; dependencies stay one level quieter.

use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Count of `-v` flags.
    pub verbosity: u8,
    /// Explicit filter; `RUST_LOG` is consulted when this is unset.
    pub filter: Option<String>,
    pub ansi: bool,
    /// Log a line with timings whenever a dispatch or run span closes.
    pub span_timings: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            filter: None,
            ansi: io::stderr().is_terminal(),
            span_timings: false,
        }
    }
}

impl TelemetryConfig {
    /// 0 is info, 1 is debug, 2 or more is trace with span timings.
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self {
            verbosity,
            span_timings: verbosity >= 2,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn level(&self) -> Level {
        match self.verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Directive used when neither an explicit filter nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        let deps = match self.level() {
            Level::TRACE => Level::DEBUG,
            Level::DEBUG => Level::INFO,
            _ => Level::WARN,
        };
        format!("{}={},{}", env!("CARGO_CRATE_NAME"), self.level(), deps).to_lowercase()
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_directive());
        match &self.filter {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Logs the metrics report when dropped at the end of `main`.
pub struct TelemetryGuard {
    _private: (),
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        tracing::debug!("{}", super::metrics::GLOBAL_METRICS.snapshot().format_report());
    }
}

/// Install the global subscriber. Call once, before serving.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<TelemetryGuard> {
    let span_events = if config.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(config.ansi)
        .with_target(config.verbosity > 0)
        .with_span_events(span_events)
        .compact();

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    Ok(TelemetryGuard { _private: () })
}
