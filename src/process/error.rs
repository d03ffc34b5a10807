// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for worker process management.

use thiserror::Error;

use crate::error::ErrorKind;
use crate::rpc::RpcError;

/// Errors that can occur while invoking a worker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("Failed to start worker {tool}: {reason}")]
    SpawnFailed { tool: String, reason: String },

    #[error("No worker configured for tool: {0}")]
    UnknownTool(String),

    #[error("Worker {tool} crashed and could not be restarted: {reason}")]
    RestartFailed { tool: String, reason: String },

    #[error("Worker {tool} exhausted its restart budget")]
    RestartBudgetExhausted { tool: String },

    #[error("Process manager is shut down")]
    Stopped,
}

impl ProcessError {
    /// Map onto the dispatch error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rpc(e) => e.kind(),
            Self::SpawnFailed { .. } | Self::RestartFailed { .. } => ErrorKind::Transport,
            Self::UnknownTool(_) | Self::RestartBudgetExhausted { .. } | Self::Stopped => {
                ErrorKind::Worker
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ProcessError::from(RpcError::Timeout(5)).kind(), ErrorKind::Timeout);
        assert_eq!(
            ProcessError::RestartBudgetExhausted { tool: "research".into() }.kind(),
            ErrorKind::Worker
        );
        assert_eq!(
            ProcessError::SpawnFailed { tool: "x".into(), reason: "y".into() }.kind(),
            ErrorKind::Transport
        );
    }

    #[test]
    fn test_rpc_error_is_transparent() {
        let err = ProcessError::from(RpcError::Timeout(250));
        assert_eq!(err.to_string(), "RPC request timed out after 250ms");
    }
}
