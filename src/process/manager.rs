// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pool of worker processes keyed by `(workspace, tool)`.
//!
//! Workers are created lazily on first use and reused afterwards. A worker
//! found crashed is relaunched at most `max_restarts` times before it serves
//! a call successfully again. Once that budget is spent the slot becomes a
//! tombstone for the session that spent it: calls from that session fail
//! fast, while the next session gets a fresh worker and a fresh budget.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::config::ProcessConfig;
use super::error::ProcessError;
use super::handle::{WorkerHandle, WorkerInfo, WorkerStatus};
use super::launcher::{CommandLauncher, WorkerLauncher};
use crate::context::{SessionContext, SessionId};
use crate::events::{EventBus, Phase, ProgressEvent};
use crate::rpc::NotificationSink;

type WorkerKey = (PathBuf, String);

#[derive(Default)]
struct SlotState {
    handle: Option<Arc<WorkerHandle>>,
    /// Launch attempts so far, successful or not.
    launches: u32,
    /// Relaunches since the worker last answered a call.
    restarts: u32,
    tombstone: Option<Tombstone>,
}

/// Left behind when the restart budget runs out.
struct Tombstone {
    session: Option<SessionId>,
}

impl Tombstone {
    fn binds(&self, current: Option<&SessionId>) -> bool {
        match (&self.session, current) {
            (Some(spent_by), Some(current)) => spent_by == current,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }
}

struct WorkerSlot {
    state: Mutex<SlotState>,
}

/// Owns every worker process of the engine.
pub struct ProcessManager {
    config: ProcessConfig,
    launcher: Arc<dyn WorkerLauncher>,
    bus: Arc<EventBus>,
    slots: Mutex<HashMap<WorkerKey, Arc<WorkerSlot>>>,
    stopped: AtomicBool,
}

impl ProcessManager {
    /// Create a manager that spawns real child processes.
    pub fn new(config: ProcessConfig, bus: Arc<EventBus>) -> Self {
        Self::with_launcher(config, bus, Arc::new(CommandLauncher))
    }

    pub fn with_launcher(
        config: ProcessConfig,
        bus: Arc<EventBus>,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Self {
        Self {
            config,
            launcher,
            bus,
            slots: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Call `operation` on the worker for `tool` in `workspace`.
    ///
    /// Starts the worker if needed and relaunches it once if it is found
    /// crashed. Never retries the call itself.
    #[instrument(skip(self, workspace, args), fields(workspace = %workspace.display()))]
    pub async fn invoke(
        &self,
        workspace: &Path,
        tool: &str,
        operation: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<Value, ProcessError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ProcessError::Stopped);
        }

        let slot = self.slot(workspace, tool).await;
        let handle = self.ensure_running(&slot, workspace, tool).await?;

        let start = Instant::now();
        let result = handle.call(operation, args, timeout).await;

        #[cfg(feature = "telemetry")]
        crate::telemetry::GLOBAL_METRICS.record_invoke(tool, start.elapsed(), result.is_ok());

        match &result {
            Ok(_) => {
                slot.state.lock().await.restarts = 0;
                debug!(tool, operation, elapsed_ms = start.elapsed().as_millis() as u64, "Invoke complete")
            }
            Err(e) if e.needs_restart() => {
                warn!(tool, operation, error = %e, "Worker transport failed; will relaunch on next call")
            }
            Err(e) => debug!(tool, operation, error = %e, "Invoke failed"),
        }

        result.map_err(ProcessError::from)
    }

    /// Status of the worker for `(workspace, tool)`, if one was ever started.
    pub async fn health(&self, workspace: &Path, tool: &str) -> Option<WorkerStatus> {
        let slot = self.slots.lock().await.get(&key(workspace, tool)).cloned()?;
        let state = slot.state.lock().await;
        match &state.handle {
            Some(handle) => Some(handle.status()),
            None if state.tombstone.is_some() => Some(WorkerStatus::Crashed),
            None => Some(WorkerStatus::Starting),
        }
    }

    /// Diagnostics for every live worker.
    pub async fn handles(&self) -> Vec<WorkerInfo> {
        let slots: Vec<_> = self.slots.lock().await.values().cloned().collect();
        let mut infos = Vec::new();
        for slot in slots {
            let handle = slot.state.lock().await.handle.clone();
            if let Some(handle) = handle {
                infos.push(handle.info().await);
            }
        }
        infos.sort_by(|a, b| (&a.workspace, &a.tool).cmp(&(&b.workspace, &b.tool)));
        infos
    }

    /// Stop and forget one worker. A later call starts a fresh one.
    pub async fn shutdown_worker(&self, workspace: &Path, tool: &str) {
        let slot = self.slots.lock().await.remove(&key(workspace, tool));
        if let Some(slot) = slot {
            if let Some(handle) = slot.state.lock().await.handle.take() {
                handle.shutdown().await;
            }
        }
    }

    /// Stop every worker and refuse further calls.
    pub async fn shutdown_all(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let slots: Vec<_> = self.slots.lock().await.drain().map(|(_, s)| s).collect();
        let count = slots.len();
        for slot in slots {
            if let Some(handle) = slot.state.lock().await.handle.take() {
                handle.shutdown().await;
            }
        }
        info!(count, "All workers stopped");
    }

    async fn slot(&self, workspace: &Path, tool: &str) -> Arc<WorkerSlot> {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(key(workspace, tool)).or_insert_with(|| {
            Arc::new(WorkerSlot {
                state: Mutex::new(SlotState::default()),
            })
        }))
    }

    /// Return a live handle, launching or relaunching as the budget allows.
    async fn ensure_running(
        &self,
        slot: &WorkerSlot,
        workspace: &Path,
        tool: &str,
    ) -> Result<Arc<WorkerHandle>, ProcessError> {
        let mut state = slot.state.lock().await;
        let session = SessionContext::current().map(|c| c.session_id);

        if let Some(tombstone) = &state.tombstone {
            if tombstone.binds(session.as_ref()) {
                return Err(ProcessError::RestartBudgetExhausted {
                    tool: tool.to_string(),
                });
            }
            info!(tool, workspace = %workspace.display(), "Restart budget renewed for a new session");
            state.tombstone = None;
            state.restarts = 0;
        }

        let restarting = match &state.handle {
            Some(handle) if !handle.is_dead() => return Ok(Arc::clone(handle)),
            Some(_) => true,
            None => state.launches > 0,
        };

        if restarting && state.restarts >= self.config.max_restarts {
            warn!(tool, workspace = %workspace.display(), restarts = state.restarts, "Restart budget exhausted");
            if let Some(dead) = state.handle.take() {
                dead.shutdown().await;
            }
            state.tombstone = Some(Tombstone { session });
            return Err(ProcessError::RestartBudgetExhausted {
                tool: tool.to_string(),
            });
        }

        if let Some(dead) = state.handle.take() {
            warn!(tool, workspace = %workspace.display(), "Worker crashed; relaunching");
            dead.shutdown().await;
            #[cfg(feature = "telemetry")]
            crate::telemetry::GLOBAL_METRICS.record_restart(tool);
        }

        let spec = self
            .config
            .spec_for(tool)
            .ok_or_else(|| ProcessError::UnknownTool(tool.to_string()))?;

        let attempt = state.launches;
        state.launches += 1;
        if restarting {
            state.restarts += 1;
        }

        let launched = match tokio::time::timeout(
            spec.startup_timeout(),
            self.launcher.launch(&spec, workspace),
        )
        .await
        {
            Ok(Ok(launched)) => launched,
            Ok(Err(e)) => return Err(launch_error(restarting, tool, e)),
            Err(_) => {
                let e = ProcessError::SpawnFailed {
                    tool: tool.to_string(),
                    reason: format!("startup timed out after {}ms", spec.startup_timeout_ms),
                };
                return Err(launch_error(restarting, tool, e));
            }
        };

        let handle = Arc::new(WorkerHandle::new(
            tool,
            workspace,
            launched,
            Some(self.progress_sink()),
            attempt,
        ));
        state.handle = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Forward worker notifications to the event bus.
    fn progress_sink(&self) -> NotificationSink {
        let bus = Arc::clone(&self.bus);
        Arc::new(move |context, note| {
            let Some(context) = context else {
                debug!(method = %note.method, "Notification outside any session; dropping");
                return;
            };
            let (progress, message) = match note.progress_params() {
                Some(p) if !p.message.is_empty() => (p.progress, p.message),
                Some(p) => (p.progress, note.method.clone()),
                None => (0.0, note.method.clone()),
            };
            bus.publish(ProgressEvent::new(
                context.session_id,
                context.agent,
                Phase::Progress,
                message,
                progress,
            ));
        })
    }
}

fn key(workspace: &Path, tool: &str) -> WorkerKey {
    (workspace.to_path_buf(), tool.to_string())
}

fn launch_error(restarting: bool, tool: &str, err: ProcessError) -> ProcessError {
    match (restarting, err) {
        (true, ProcessError::SpawnFailed { reason, .. }) => ProcessError::RestartFailed {
            tool: tool.to_string(),
            reason,
        },
        (_, err) => err,
    }
}
