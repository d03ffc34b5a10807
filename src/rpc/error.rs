// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for worker RPC.

use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur while talking to a worker over its RPC channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The worker's stream is closed or could not be written.
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The call did not complete in time.
    #[error("RPC request timed out after {0}ms")]
    Timeout(u64),

    /// A frame could not be encoded or decoded.
    #[error("RPC protocol error: {0}")]
    Protocol(String),

    /// The worker returned an error response.
    #[error("Worker error {code}: {message}")]
    Worker {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },
}

impl RpcError {
    /// Create a worker error from an error response.
    pub fn worker(code: i64, message: impl Into<String>) -> Self {
        Self::Worker {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Map onto the dispatch error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Worker { .. } => ErrorKind::Worker,
        }
    }

    /// Check if the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transport(_))
    }

    /// Check if the worker needs to be restarted.
    pub fn needs_restart(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for RPC operations.
pub type RpcResult<T> = std::result::Result<T, RpcError>;

/// JSON-RPC error codes used on worker channels.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The operation does not exist on this worker.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid operation parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal worker error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RpcError::Timeout(30_000);
        assert_eq!(err.to_string(), "RPC request timed out after 30000ms");
    }

    #[test]
    fn test_worker_error() {
        let err = RpcError::worker(error_codes::METHOD_NOT_FOUND, "no such operation");
        match err {
            RpcError::Worker { code, message, data } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "no such operation");
                assert!(data.is_none());
            }
            _ => panic!("Expected Worker"),
        }
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(RpcError::Transport("eof".into()).kind(), ErrorKind::Transport);
        assert_eq!(RpcError::Timeout(1).kind(), ErrorKind::Timeout);
        assert_eq!(RpcError::Protocol("bad".into()).kind(), ErrorKind::Protocol);
        assert_eq!(RpcError::worker(1, "x").kind(), ErrorKind::Worker);
    }

    #[test]
    fn test_needs_restart() {
        assert!(RpcError::Transport("pipe broken".to_string()).needs_restart());
        assert!(!RpcError::Timeout(5000).needs_restart());
        assert!(RpcError::Timeout(5000).is_retryable());
        assert!(!RpcError::worker(1, "boom").is_retryable());
    }
}
