// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Out-of-process worker management.
//!
//! Each tool is served by a worker process speaking newline-delimited
//! JSON-RPC on its stdio. The [`ProcessManager`] starts workers on demand,
//! one per `(workspace, tool)` pair, and relaunches crashed ones within a
//! restart budget.

pub mod config;
pub mod error;
pub mod handle;
pub mod launcher;
pub mod manager;

pub use config::{ProcessConfig, WorkerSpec};
pub use error::ProcessError;
pub use handle::{WorkerHandle, WorkerInfo, WorkerStatus};
pub use launcher::{CommandLauncher, LaunchedWorker, WorkerLauncher};
pub use manager::ProcessManager;
