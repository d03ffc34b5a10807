// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Line-delimited JSON-RPC plumbing between the orchestrator and its workers.

pub mod channel;
pub mod error;
pub mod protocol;

pub use channel::{BoxedReader, BoxedWriter, NotificationSink, RpcChannel};
pub use error::{error_codes, RpcError, RpcResult};
pub use protocol::{
    decode, encode, normalize_progress, ErrorObject, Notification, ProgressParams, Request,
    Response, RpcMessage,
};
