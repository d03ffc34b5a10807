// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Bidirectional newline-delimited JSON channel to one worker.
//!
//! A channel owns two background tasks: a writer that drains an mpsc queue
//! onto the worker's input (so there is exactly one writer per stream), and a
//! reader that splits the worker's output into lines and routes each frame.
//! Responses are matched to callers through the pending map; notifications
//! are handed to a [`NotificationSink`] together with the session context of
//! the call they belong to.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::error::{error_codes, RpcError, RpcResult};
use super::protocol::{self, ErrorObject, Notification, Request, Response, RpcMessage};
use crate::context::SessionContext;

/// Read half of a worker stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a worker stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Receives worker notifications along with the context of the call they
/// were attributed to (if any).
pub type NotificationSink = Arc<dyn Fn(Option<SessionContext>, Notification) + Send + Sync>;

/// Outgoing queue depth.
const WRITE_QUEUE: usize = 100;

/// Timed-out ids remembered so late responses can be told apart from garbage.
const MAX_ABANDONED: usize = 1024;

/// Longest frame accepted from a worker, newline included.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

struct PendingCall {
    tx: oneshot::Sender<Result<Value, ErrorObject>>,
    context: Option<SessionContext>,
    method: String,
}

type PendingMap = Arc<Mutex<HashMap<u64, PendingCall>>>;

/// A multiplexed request/response channel to a single worker.
pub struct RpcChannel {
    name: String,
    request_id: AtomicU64,
    pending: PendingMap,
    abandoned: Arc<Mutex<HashSet<u64>>>,
    closed: Arc<AtomicBool>,
    tx: mpsc::Sender<String>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl RpcChannel {
    /// Start the reader and writer tasks over the given stream halves.
    pub fn spawn(
        name: impl Into<String>,
        reader: BoxedReader,
        writer: BoxedWriter,
        sink: Option<NotificationSink>,
    ) -> Self {
        let name = name.into();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let abandoned = Arc::new(Mutex::new(HashSet::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<String>(WRITE_QUEUE);

        let writer_task = tokio::spawn(Self::write_messages(
            name.clone(),
            writer,
            rx,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        let reader_task = tokio::spawn(Self::read_messages(
            name.clone(),
            BufReader::new(reader),
            Arc::clone(&pending),
            Arc::clone(&abandoned),
            Arc::clone(&closed),
            tx.clone(),
            sink,
        ));

        Self {
            name,
            request_id: AtomicU64::new(1),
            pending,
            abandoned,
            closed,
            tx,
            reader_task,
            writer_task,
        }
    }

    /// Name of the worker on the other end.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the stream has hit EOF or a write failure.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ids of calls still waiting for a response.
    pub async fn inflight(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Send a request and wait for its response.
    ///
    /// The call is tagged with the ambient [`SessionContext`] so progress the
    /// worker emits while serving it reaches the right session.
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> RpcResult<Value> {
        if self.is_closed() {
            return Err(RpcError::Transport(format!("channel to {} is closed", self.name)));
        }

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let line = protocol::encode(&RpcMessage::from(Request::new(id, method, params)))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(
            id,
            PendingCall {
                tx,
                context: SessionContext::current(),
                method: method.to_string(),
            },
        );

        trace!(worker = %self.name, id, method, "Sending request");
        if self.tx.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(RpcError::Transport(format!("writer for {} has stopped", self.name)));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(error))) => Err(RpcError::Worker {
                code: error.code,
                message: error.message,
                data: error.data,
            }),
            Ok(Err(_)) => Err(RpcError::Transport(format!(
                "{} closed its stream before responding",
                self.name
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                let mut abandoned = self.abandoned.lock().await;
                if abandoned.len() >= MAX_ABANDONED {
                    abandoned.clear();
                }
                abandoned.insert(id);
                Err(RpcError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Send a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Value) -> RpcResult<()> {
        if self.is_closed() {
            return Err(RpcError::Transport(format!("channel to {} is closed", self.name)));
        }
        let line = protocol::encode(&RpcMessage::from(Notification::new(method, params)))?;
        self.tx
            .send(line)
            .await
            .map_err(|_| RpcError::Transport(format!("writer for {} has stopped", self.name)))
    }

    /// Stop both tasks and fail every outstanding call.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader_task.abort();
        self.writer_task.abort();
        fail_pending(&self.pending).await;
    }

    async fn write_messages(
        name: String,
        mut writer: BoxedWriter,
        mut rx: mpsc::Receiver<String>,
        pending: PendingMap,
        closed: Arc<AtomicBool>,
    ) {
        while let Some(line) = rx.recv().await {
            let written = async {
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await
            }
            .await;

            if let Err(e) = written {
                warn!(worker = %name, error = %e, "Write to worker failed");
                closed.store(true, Ordering::SeqCst);
                fail_pending(&pending).await;
                break;
            }
        }
    }

    async fn read_messages(
        name: String,
        mut reader: BufReader<BoxedReader>,
        pending: PendingMap,
        abandoned: Arc<Mutex<HashSet<u64>>>,
        closed: Arc<AtomicBool>,
        tx: mpsc::Sender<String>,
        sink: Option<NotificationSink>,
    ) {
        let mut buf = Vec::new();

        loop {
            let line = match next_frame(&mut reader, &mut buf, MAX_FRAME_BYTES).await {
                Ok(Frame::Line(line)) => line,
                Ok(Frame::Malformed(reason)) => {
                    dropped_frame(&name, &reason);
                    continue;
                }
                Ok(Frame::Eof) => {
                    debug!(worker = %name, "Worker stream reached EOF");
                    break;
                }
                Err(e) => {
                    warn!(worker = %name, error = %e, "Read from worker failed");
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let message = match protocol::decode(&line) {
                Ok(message) => message,
                Err(e) => {
                    dropped_frame(&name, &e.to_string());
                    continue;
                }
            };

            match message {
                RpcMessage::Response(response) => {
                    Self::route_response(&name, response, &pending, &abandoned).await;
                }
                RpcMessage::Notification(note) => {
                    let context = attribute(&note, &pending).await;
                    match &sink {
                        Some(sink) => sink(context, note),
                        None => trace!(worker = %name, method = %note.method, "Ignoring notification"),
                    }
                }
                RpcMessage::Request(request) => {
                    debug!(worker = %name, method = %request.method, "Worker sent a request; rejecting");
                    let reply = Response::error(
                        request.id,
                        error_codes::METHOD_NOT_FOUND,
                        format!("orchestrator does not serve '{}'", request.method),
                    );
                    if let Ok(line) = protocol::encode(&RpcMessage::from(reply)) {
                        let _ = tx.send(line).await;
                    }
                }
            }
        }

        closed.store(true, Ordering::SeqCst);
        fail_pending(&pending).await;
    }

    async fn route_response(
        name: &str,
        response: Response,
        pending: &PendingMap,
        abandoned: &Arc<Mutex<HashSet<u64>>>,
    ) {
        let entry = pending.lock().await.remove(&response.id);
        match entry {
            Some(call) => {
                trace!(worker = %name, id = response.id, method = %call.method, "Response received");
                // The caller may have given up in the meantime.
                let _ = call.tx.send(response.result);
            }
            None => {
                if abandoned.lock().await.remove(&response.id) {
                    warn!(worker = %name, id = response.id, "Discarding late response for timed-out call");
                } else {
                    warn!(worker = %name, id = response.id, "Discarding response with unknown or duplicate id");
                }
            }
        }
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}

/// One newline-terminated unit read from a worker.
#[derive(Debug, PartialEq)]
enum Frame {
    Line(String),
    /// Not UTF-8 or over the size limit; the bytes have been consumed.
    Malformed(String),
    Eof,
}

/// Read the next frame, consuming at most one line.
///
/// An oversized line is skipped through its newline so the following frame
/// starts clean. A final line without a newline is still returned.
async fn next_frame<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader).take(limit as u64).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Frame::Eof);
    }

    if buf.last() != Some(&b'\n') && read >= limit {
        skip_line(reader).await?;
        return Ok(Frame::Malformed(format!("frame exceeds {} bytes", limit)));
    }

    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    match String::from_utf8(std::mem::take(buf)) {
        Ok(line) => Ok(Frame::Line(line)),
        Err(e) => Ok(Frame::Malformed(format!("invalid UTF-8: {}", e.utf8_error()))),
    }
}

/// Discard input up to and including the next newline.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

fn dropped_frame(worker: &str, reason: &str) {
    warn!(worker, reason, "Dropping malformed frame");
    #[cfg(feature = "telemetry")]
    crate::telemetry::GLOBAL_METRICS.record_malformed_frame();
}

/// Pick the session a notification belongs to.
///
/// An explicit `requestId` wins; otherwise the oldest outstanding call on
/// this channel is assumed to be the one reporting.
async fn attribute(note: &Notification, pending: &PendingMap) -> Option<SessionContext> {
    let pending = pending.lock().await;
    let explicit = note
        .params
        .get("requestId")
        .and_then(Value::as_u64)
        .and_then(|id| pending.get(&id));

    let call = match explicit {
        Some(call) => Some(call),
        None => pending.keys().min().and_then(|id| pending.get(id)),
    };
    call.and_then(|c| c.context.clone())
}

/// Dropping the senders wakes every waiter with a transport error.
async fn fail_pending(pending: &PendingMap) {
    let drained: Vec<_> = pending.lock().await.drain().collect();
    if !drained.is_empty() {
        debug!(count = drained.len(), "Failing outstanding calls");
    }
}
