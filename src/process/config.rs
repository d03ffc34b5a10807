// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Worker process configuration.
//!
//! Each tool name maps to the command that starts its worker. Tools without
//! an explicit entry fall back to `defaultCommand` with the tool name
//! appended as the last argument, when one is configured.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// How to start the worker serving one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    /// Tool name the worker serves (e.g. "research", "supervisor").
    #[serde(default)]
    pub name: String,
    /// Command to start the worker.
    pub command: String,
    /// Command arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Whether the worker is disabled.
    #[serde(default)]
    pub disabled: bool,
    /// Time allowed for the process to come up, in milliseconds.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_ms: u64,
}

fn default_startup_timeout() -> u64 {
    10000
}

fn default_max_restarts() -> u32 {
    1
}

impl WorkerSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            disabled: false,
            startup_timeout_ms: default_startup_timeout(),
        }
    }

    /// Add command arguments.
    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

/// Settings for the process manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    /// Explicit per-tool worker specs.
    #[serde(default)]
    pub workers: HashMap<String, WorkerSpec>,
    /// Command used for tools with no explicit spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_command: Option<String>,
    /// Restarts allowed per worker after its first launch.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            workers: HashMap::new(),
            default_command: None,
            max_restarts: default_max_restarts(),
        }
    }
}

impl ProcessConfig {
    /// Register a worker, keyed by its name.
    pub fn with_worker(mut self, spec: WorkerSpec) -> Self {
        self.workers.insert(spec.name.clone(), spec);
        self
    }

    /// Resolve the spec for `tool`, if it can be started at all.
    pub fn spec_for(&self, tool: &str) -> Option<WorkerSpec> {
        if let Some(spec) = self.workers.get(tool) {
            if spec.disabled {
                return None;
            }
            let mut spec = spec.clone();
            if spec.name.is_empty() {
                spec.name = tool.to_string();
            }
            return Some(spec);
        }

        self.default_command
            .as_ref()
            .map(|command| WorkerSpec::new(tool, command.clone()).with_args(&[tool]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_spec_wins() {
        let config = ProcessConfig {
            default_command: Some("conductor-worker".to_string()),
            ..Default::default()
        }
        .with_worker(WorkerSpec::new("research", "python3").with_args(&["-m", "agents.research"]));

        let spec = config.spec_for("research").unwrap();
        assert_eq!(spec.command, "python3");
        assert_eq!(spec.args, vec!["-m", "agents.research"]);
    }

    #[test]
    fn test_default_command_fallback() {
        let config = ProcessConfig {
            default_command: Some("conductor-worker".to_string()),
            ..Default::default()
        };
        let spec = config.spec_for("design").unwrap();
        assert_eq!(spec.name, "design");
        assert_eq!(spec.command, "conductor-worker");
        assert_eq!(spec.args, vec!["design"]);
    }

    #[test]
    fn test_unknown_and_disabled() {
        let mut disabled = WorkerSpec::new("validation", "validator");
        disabled.disabled = true;
        let config = ProcessConfig::default().with_worker(disabled);

        assert!(config.spec_for("validation").is_none());
        assert!(config.spec_for("anything").is_none());
    }

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "workers": {"generation": {"command": "gen", "startupTimeoutMs": 500}},
            "maxRestarts": 2
        }"#;
        let config: ProcessConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_restarts, 2);
        let spec = config.spec_for("generation").unwrap();
        assert_eq!(spec.name, "generation");
        assert_eq!(spec.startup_timeout(), Duration::from_millis(500));
    }
}
