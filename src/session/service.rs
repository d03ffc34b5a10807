// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session service: one client connection, at most one running workflow.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::SessionId;
use crate::error::SessionError;
use crate::events::EventBus;
use crate::workflow::{OutcomeStatus, Router, WorkflowOutcome, WorkflowState};

use super::protocol::{InboundMessage, OutboundEvent};

/// Where outbound events go.
pub type OutboundSender = mpsc::UnboundedSender<OutboundEvent>;

struct ActiveRun {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Handles inbound messages for one client session.
pub struct SessionService {
    session_id: SessionId,
    router: Arc<Router>,
    bus: Arc<EventBus>,
    outbound: OutboundSender,
    workspace: Option<PathBuf>,
    run: Option<ActiveRun>,
}

impl SessionService {
    pub fn new(router: Arc<Router>, bus: Arc<EventBus>, outbound: OutboundSender) -> Self {
        Self {
            session_id: SessionId::new(),
            router,
            bus,
            outbound,
            workspace: None,
            run: None,
        }
    }

    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// Announce the session to the client.
    pub fn connect(&self) {
        self.emit(OutboundEvent::Connected {
            session_id: self.session_id.clone(),
        });
    }

    /// Parse and handle one inbound line; failures become `error` events.
    pub fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Err(e) = InboundMessage::parse(line).and_then(|msg| self.handle(msg)) {
            warn!(session = %self.session_id.short(), code = e.code(), error = %e, "Rejected inbound message");
            self.emit(OutboundEvent::error(&e));
        }
    }

    pub fn handle(&mut self, message: InboundMessage) -> Result<(), SessionError> {
        match message {
            InboundMessage::Init { workspace_path } => {
                let workspace = self.init(&workspace_path)?;
                self.emit(OutboundEvent::Initialized {
                    workspace_path: workspace,
                });
                Ok(())
            }
            InboundMessage::Message { content } => self.message(content),
            InboundMessage::Cancel => {
                self.cancel();
                Ok(())
            }
        }
    }

    /// Bind the session to an existing workspace directory.
    pub fn init(&mut self, path: &Path) -> Result<PathBuf, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        if !path.is_dir() {
            return Err(SessionError::WorkspaceNotFound(path.display().to_string()));
        }
        let workspace = path.canonicalize()?;
        info!(session = %self.session_id.short(), workspace = %workspace.display(), "Session initialized");
        self.workspace = Some(workspace.clone());
        Ok(workspace)
    }

    /// Start a workflow for `content`. Its events and final `result` are
    /// emitted from a background task.
    pub fn message(&mut self, content: String) -> Result<(), SessionError> {
        let workspace = self.workspace.clone().ok_or(SessionError::NotInitialized)?;
        if content.trim().is_empty() {
            return Err(SessionError::InvalidMessage("message content is empty".to_string()));
        }
        if self.is_busy() {
            return Err(SessionError::Busy);
        }

        let cancel = CancellationToken::new();
        // Subscribe before the run starts so no event is missed.
        let mut subscription = self.bus.subscribe(&self.session_id);
        let state = WorkflowState::new(self.session_id.clone(), content, workspace);

        let router = Arc::clone(&self.router);
        let bus = Arc::clone(&self.bus);
        let outbound = self.outbound.clone();
        let session_id = self.session_id.clone();
        let run_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let forwarder = {
                let bus = Arc::clone(&bus);
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    while let Some(event) = subscription.recv_counted(&bus).await {
                        if outbound.send(OutboundEvent::from(&event)).is_err() {
                            break;
                        }
                    }
                })
            };

            let run = tokio::spawn(async move { router.run_until_cancelled(state, &run_cancel).await });
            let joined = run.await;

            bus.close_session(&session_id);
            if let Err(e) = forwarder.await {
                debug!(error = %e, "Event forwarder ended abnormally");
            }

            let result = match joined {
                Ok(state) => {
                    let outcome = WorkflowOutcome::from_state(state);
                    info!(
                        session = %session_id.short(),
                        status = ?outcome.status,
                        termination = %outcome.termination,
                        iterations = outcome.state.iteration,
                        "Workflow result"
                    );
                    OutboundEvent::result(&outcome)
                }
                Err(e) => {
                    error!(session = %session_id.short(), error = %e, "Workflow task failed");
                    let _ = outbound.send(OutboundEvent::Error {
                        message: format!("workflow aborted: {}", e),
                        code: "internal".to_string(),
                    });
                    OutboundEvent::Result {
                        status: OutcomeStatus::Error,
                        content: "The workflow aborted before producing a response.".to_string(),
                    }
                }
            };
            let _ = outbound.send(result);
        });

        self.run = Some(ActiveRun { cancel, task });
        Ok(())
    }

    /// Whether a workflow is still running.
    pub fn is_busy(&self) -> bool {
        self.run.as_ref().is_some_and(|run| !run.task.is_finished())
    }

    /// Request cancellation of the running workflow. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        match &self.run {
            Some(run) if !run.task.is_finished() => {
                info!(session = %self.session_id.short(), "Cancelling workflow");
                run.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Wait for the running workflow, if any, to emit its result.
    pub async fn wait(&mut self) {
        if let Some(run) = self.run.take() {
            if let Err(e) = run.task.await {
                error!(error = %e, "Session run task failed");
            }
        }
    }

    /// Cancel any running workflow and wait for it to finish.
    pub async fn shutdown(&mut self) {
        self.cancel();
        self.wait().await;
    }

    fn emit(&self, event: OutboundEvent) {
        if self.outbound.send(event).is_err() {
            debug!(session = %self.session_id.short(), "Client gone; dropping event");
        }
    }
}
