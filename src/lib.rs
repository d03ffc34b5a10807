// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Conductor - supervisor-driven orchestration of out-of-process agents.
//!
//! A client request becomes a workflow: a supervisor repeatedly chooses the
//! next specialist agent, the router dispatches it to a worker process over
//! line-delimited JSON-RPC, and the result patch is merged into the shared
//! workflow state until the supervisor decides to finish.
//!
//! # Architecture
//!
//! - [`workflow`] - Supervisor decisions, the router loop, agent adapters
//! - [`process`] - Worker process lifecycle and the restart budget
//! - [`rpc`] - JSON-RPC framing and the per-worker channel
//! - [`events`] - Session-scoped progress event bus
//! - [`session`] - Client-facing session protocol and stdio server
//! - [`context`] - Session identity carried across async calls
//! - [`config`] - Configuration loading and merging
//! - [`telemetry`] - Tracing and metrics
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use conductor::config::{load_config, CliOptions};
//! use conductor::runtime::Runtime;
//! use conductor::workflow::WorkflowState;
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let runtime = Runtime::from_config(&config);
//! let state = WorkflowState::new(Default::default(), "add a --verbose flag", ".");
//! let finished = runtime.router.run(state).await;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod process;
pub mod rpc;
pub mod runtime;
pub mod session;
pub mod telemetry;
pub mod workflow;

// Re-export commonly used types at crate root
pub use context::{SessionContext, SessionId};
pub use error::{ConfigError, ErrorKind, Result, SessionError, SupervisorError};
pub use events::{EventBus, Phase, ProgressEvent};
pub use process::{ProcessError, ProcessManager};
pub use rpc::RpcError;
pub use workflow::{
    AgentId, Decision, OutcomeStatus, Router, Supervisor, WorkflowOutcome, WorkflowState,
};

/// Conductor version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
