// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire protocol for worker channels.
//!
//! Every frame is one JSON object followed by a newline. The shape of the
//! object decides what it is:
//!
//! ```text
//! Request:       {"id": 1, "method": "research", "params": {...}}
//! Response(ok):  {"id": 1, "result": {...}}
//! Response(err): {"id": 1, "error": {"code": -32603, "message": "..."}}
//! Notification:  {"method": "progress", "params": {"progress": 0.5, "message": "...", "total": 1.0}}
//! ```
//!
//! Anything carrying an `id` but no `method` is a response; anything without an
//! `id` is a notification.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{RpcError, RpcResult};

// ============================================================================
// Message Types
// ============================================================================

/// A call from the orchestrator to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// Error payload of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The single reply to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: u64,
    pub result: Result<Value, ErrorObject>,
}

/// An unsolicited message from a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

/// Any frame that can travel over a worker channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    Request(Request),
    Response(Response),
    Notification(Notification),
}

/// Progress payload carried by notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// Completion fraction, clamped to `0..=1` on read.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Id of the request this progress belongs to, when the worker knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

// ============================================================================
// Envelope
// ============================================================================

/// Flat on-the-wire shape shared by all three message kinds.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorObject>,
}

impl From<&RpcMessage> for Envelope {
    fn from(msg: &RpcMessage) -> Self {
        match msg {
            RpcMessage::Request(req) => Envelope {
                id: Some(req.id),
                method: Some(req.method.clone()),
                params: Some(req.params.clone()),
                ..Default::default()
            },
            RpcMessage::Response(resp) => match &resp.result {
                Ok(value) => Envelope {
                    id: Some(resp.id),
                    result: Some(value.clone()),
                    ..Default::default()
                },
                Err(error) => Envelope {
                    id: Some(resp.id),
                    error: Some(error.clone()),
                    ..Default::default()
                },
            },
            RpcMessage::Notification(note) => Envelope {
                method: Some(note.method.clone()),
                params: Some(note.params.clone()),
                ..Default::default()
            },
        }
    }
}

impl TryFrom<Envelope> for RpcMessage {
    type Error = RpcError;

    fn try_from(env: Envelope) -> RpcResult<Self> {
        match (env.id, env.method) {
            (Some(id), Some(method)) => Ok(RpcMessage::Request(Request {
                id,
                method,
                params: env.params.unwrap_or(Value::Null),
            })),
            (Some(id), None) => {
                let result = match env.error {
                    Some(error) => Err(error),
                    None => Ok(env.result.unwrap_or(Value::Null)),
                };
                Ok(RpcMessage::Response(Response { id, result }))
            }
            (None, Some(method)) => Ok(RpcMessage::Notification(Notification {
                method,
                params: env.params.unwrap_or(Value::Null),
            })),
            (None, None) => Err(RpcError::Protocol(
                "message has neither id nor method".to_string(),
            )),
        }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

impl Response {
    /// Create a successful response.
    pub fn ok(id: u64, result: Value) -> Self {
        Self { id, result: Ok(result) }
    }

    /// Create an error response.
    pub fn error(id: u64, code: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Err(ErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// Build a progress notification.
    pub fn progress(progress: f64, message: impl Into<String>) -> Self {
        let params = ProgressParams {
            progress,
            message: message.into(),
            total: Some(1.0),
            request_id: None,
        };
        Self {
            method: "progress".to_string(),
            params: serde_json::to_value(params).unwrap_or(Value::Null),
        }
    }

    /// Interpret the params as a progress payload.
    ///
    /// Returns `None` when the params are not an object.
    pub fn progress_params(&self) -> Option<ProgressParams> {
        if !self.params.is_object() {
            return None;
        }
        let mut params: ProgressParams = serde_json::from_value(self.params.clone()).ok()?;
        params.progress = normalize_progress(params.progress, params.total);
        Some(params)
    }
}

/// Fold a `progress`/`total` pair into a `0..=1` fraction.
///
/// Workers that report absolute counts (`progress: 3, total: 10`) are scaled;
/// fractional reports are clamped.
pub fn normalize_progress(progress: f64, total: Option<f64>) -> f64 {
    if !progress.is_finite() {
        return 0.0;
    }
    let fraction = match total {
        Some(total) if total.is_finite() && total > 1.0 => progress / total,
        _ => progress,
    };
    fraction.clamp(0.0, 1.0)
}

// ============================================================================
// Serialization
// ============================================================================

impl RpcMessage {
    /// Request id, if this message carries one.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Request(r) => Some(r.id),
            Self::Response(r) => Some(r.id),
            Self::Notification(_) => None,
        }
    }

    /// Encode to a newline-terminated JSON line.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        encode(self)
    }

    /// Decode one frame.
    pub fn decode(line: &str) -> RpcResult<Self> {
        decode(line)
    }
}

/// Encode a message to a newline-delimited JSON string.
pub fn encode(msg: &RpcMessage) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string(&Envelope::from(msg))?;
    json.push('\n');
    Ok(json)
}

/// Decode a message from one JSON line.
pub fn decode(line: &str) -> RpcResult<RpcMessage> {
    let envelope: Envelope = serde_json::from_str(line.trim())?;
    RpcMessage::try_from(envelope)
}

impl From<Request> for RpcMessage {
    fn from(r: Request) -> Self {
        Self::Request(r)
    }
}

impl From<Response> for RpcMessage {
    fn from(r: Response) -> Self {
        Self::Response(r)
    }
}

impl From<Notification> for RpcMessage {
    fn from(n: Notification) -> Self {
        Self::Notification(n)
    }
}
