// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! A running worker and its lifecycle state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::process::Child;
use tracing::debug;

use super::launcher::LaunchedWorker;
use crate::rpc::{NotificationSink, RpcChannel, RpcError, RpcResult};

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Being launched.
    Starting,
    /// Accepting calls.
    Ready,
    /// Its last call timed out; still accepts calls.
    Busy,
    /// The process exited or its stream closed.
    Crashed,
    /// Shut down on purpose.
    Stopped,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Busy => write!(f, "busy"),
            Self::Crashed => write!(f, "crashed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// One live worker process for a `(workspace, tool)` pair.
pub struct WorkerHandle {
    tool: String,
    workspace: PathBuf,
    pid: Option<u32>,
    channel: RpcChannel,
    child: Mutex<Option<Child>>,
    busy: AtomicBool,
    stopped: AtomicBool,
    launch: u32,
    started_at: DateTime<Utc>,
}

/// Point-in-time view of a worker for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    pub tool: String,
    pub workspace: PathBuf,
    pub pid: Option<u32>,
    pub status: WorkerStatus,
    pub inflight: Vec<u64>,
    pub restarts: u32,
    pub started_at: DateTime<Utc>,
}

impl WorkerHandle {
    pub(crate) fn new(
        tool: &str,
        workspace: &Path,
        launched: LaunchedWorker,
        sink: Option<NotificationSink>,
        launch: u32,
    ) -> Self {
        let pid = launched.pid();
        let channel = RpcChannel::spawn(tool, launched.reader, launched.writer, sink);
        Self {
            tool: tool.to_string(),
            workspace: workspace.to_path_buf(),
            pid,
            channel,
            child: Mutex::new(launched.child),
            busy: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            launch,
            started_at: Utc::now(),
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current status, derived from the process and channel.
    pub fn status(&self) -> WorkerStatus {
        if self.stopped.load(Ordering::SeqCst) {
            WorkerStatus::Stopped
        } else if self.channel.is_closed() || self.has_exited() {
            WorkerStatus::Crashed
        } else if self.busy.load(Ordering::SeqCst) {
            WorkerStatus::Busy
        } else {
            WorkerStatus::Ready
        }
    }

    /// Whether the process behind this handle is gone.
    pub fn is_dead(&self) -> bool {
        matches!(self.status(), WorkerStatus::Crashed | WorkerStatus::Stopped)
    }

    fn has_exited(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(|e| e.into_inner());
        match child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
            None => false,
        }
    }

    /// Call `operation` on the worker.
    pub async fn call(&self, operation: &str, params: Value, timeout: Duration) -> RpcResult<Value> {
        let result = self.channel.call(operation, params, timeout).await;
        match &result {
            Err(RpcError::Timeout(_)) => {
                debug!(worker = %self.tool, operation, "Call timed out; marking worker busy");
                self.busy.store(true, Ordering::SeqCst);
            }
            Ok(_) => self.busy.store(false, Ordering::SeqCst),
            Err(_) => {}
        }
        result
    }

    pub async fn info(&self) -> WorkerInfo {
        WorkerInfo {
            tool: self.tool.clone(),
            workspace: self.workspace.clone(),
            pid: self.pid,
            status: self.status(),
            inflight: self.channel.inflight().await,
            restarts: self.launch,
            started_at: self.started_at,
        }
    }

    /// Close the channel and kill the process.
    pub async fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.channel.close().await;
        let child = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = child {
            let _ = child.start_kill();
        }
        debug!(worker = %self.tool, workspace = %self.workspace.display(), "Worker stopped");
    }
}
