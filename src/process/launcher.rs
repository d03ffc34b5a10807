// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Starting worker processes.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::config::WorkerSpec;
use super::error::ProcessError;
use crate::rpc::{BoxedReader, BoxedWriter};

/// The stream halves (and process, if there is one) of a started worker.
pub struct LaunchedWorker {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub child: Option<Child>,
}

impl LaunchedWorker {
    /// A worker with no OS process behind it.
    pub fn detached(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader,
            writer,
            child: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }
}

/// Starts workers for the process manager.
#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, spec: &WorkerSpec, workspace: &Path) -> Result<LaunchedWorker, ProcessError>;
}

/// Spawns each worker as a child process speaking over stdin/stdout.
///
/// The worker's stderr is forwarded to the log at debug level.
#[derive(Debug, Default, Clone)]
pub struct CommandLauncher;

#[async_trait]
impl WorkerLauncher for CommandLauncher {
    async fn launch(&self, spec: &WorkerSpec, workspace: &Path) -> Result<LaunchedWorker, ProcessError> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .current_dir(workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let spawn_failed = |reason: String| ProcessError::SpawnFailed {
            tool: spec.name.clone(),
            reason,
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| spawn_failed(format!("failed to spawn {}: {}", spec.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_failed("failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed("failed to get stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            let tool = spec.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(worker = %tool, "{}", line);
                }
            });
        }

        info!(worker = %spec.name, pid = ?child.id(), command = %spec.command, "Worker started");

        Ok(LaunchedWorker {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            child: Some(child),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let spec = WorkerSpec::new("research", "/nonexistent/conductor-worker-binary");
        let dir = tempfile::tempdir().unwrap();

        let err = CommandLauncher.launch(&spec, dir.path()).await.err().unwrap();
        match err {
            ProcessError::SpawnFailed { tool, reason } => {
                assert_eq!(tool, "research");
                assert!(reason.contains("/nonexistent/conductor-worker-binary"));
            }
            other => panic!("expected SpawnFailed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_real_process() {
        let spec = WorkerSpec::new("echo", "cat");
        let dir = tempfile::tempdir().unwrap();

        let mut launched = CommandLauncher.launch(&spec, dir.path()).await.unwrap();
        assert!(launched.pid().is_some());
        if let Some(child) = launched.child.as_mut() {
            child.kill().await.unwrap();
        }
    }
}
