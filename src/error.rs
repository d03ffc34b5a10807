// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the Conductor orchestration engine.
//!
//! This module provides strongly-typed errors for the parts of the engine that
//! are not tied to a single subsystem, using `thiserror` for ergonomic error
//! definitions and `anyhow` for error propagation at the binary boundary.
//! Subsystem errors live next to their code ([`crate::rpc::RpcError`],
//! [`crate::process::ProcessError`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of every failure an agent dispatch can produce.
///
/// Every concrete error maps onto exactly one kind, and the kind is what ends
/// up recorded in the workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The worker's stream could not be written or read; the process is likely dead.
    Transport,
    /// No response arrived within the call timeout.
    Timeout,
    /// A malformed or unmatched message was received.
    Protocol,
    /// The worker answered with an error response.
    Worker,
    /// The reasoner failed or produced an invalid decision.
    Supervisor,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Timeout => write!(f, "timeout"),
            Self::Protocol => write!(f, "protocol"),
            Self::Worker => write!(f, "worker"),
            Self::Supervisor => write!(f, "supervisor"),
        }
    }
}

/// Errors produced while asking the reasoner for the next step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SupervisorError {
    #[error("Reasoner failed: {0}")]
    ReasonerFailed(String),

    #[error("Unparseable decision: {0}")]
    InvalidDecision(String),

    #[error("Unknown agent id: {0}")]
    UnknownAgent(String),

    #[error("Confidence out of range: {0}")]
    InvalidConfidence(f64),
}

impl SupervisorError {
    /// All supervisor errors share one taxonomy kind.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Supervisor
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors raised by the client-facing session layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Session not initialized: send `init` first")]
    NotInitialized,

    #[error("Invalid inbound message: {0}")]
    InvalidMessage(String),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("A workflow is already running for this session")]
    Busy,

    #[error("IO error: {0}")]
    IoError(String),
}

impl SessionError {
    /// Stable machine-readable code sent in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::InvalidMessage(_) => "invalid_message",
            Self::WorkspaceNotFound(_) => "workspace_not_found",
            Self::Busy => "busy",
            Self::IoError(_) => "io_error",
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;
