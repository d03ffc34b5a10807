// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Defines the structure of workspace and resolved configuration,
//! supporting JSON and YAML formats.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::events::DEFAULT_CAPACITY;
use crate::process::{ProcessConfig, WorkerSpec};
use crate::workflow::{AgentBinding, AgentId, SupervisorConfig, TimeoutConfig};

/// Workspace configuration for Conductor.
/// Can be defined in .conductor.json or .conductor/config.json in the project root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Workflow limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowLimitsConfig>,

    /// Per-class call timeouts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutsConfig>,

    /// Worker commands by tool name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<HashMap<String, WorkerSpec>>,

    /// Command for tools with no entry in `workers`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_command: Option<String>,

    /// Restarts allowed per worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<u32>,

    /// Agent to tool/operation bindings, keyed by agent name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents: Option<HashMap<String, AgentBinding>>,

    /// Progress events buffered per subscriber
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_capacity: Option<usize>,

    /// Which reasoner proposes the next agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoner: Option<ReasonerConfig>,
}

/// Workflow limit overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowLimitsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_agent_cap: Option<u32>,
}

/// Timeout overrides in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_ms: Option<u64>,
}

/// Reasoner implementations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasonerKind {
    /// Built-in fixed plan.
    #[default]
    Plan,
    /// Delegate to a supervisor worker.
    Worker,
}

impl std::str::FromStr for ReasonerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plan" => Ok(Self::Plan),
            "worker" => Ok(Self::Worker),
            other => Err(format!("unknown reasoner: {} (expected plan or worker)", other)),
        }
    }
}

/// Reasoner selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasonerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ReasonerKind>,
    /// Worker tool, for the worker reasoner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Resolved reasoner selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedReasonerConfig {
    pub kind: ReasonerKind,
    pub tool: String,
    pub operation: String,
    pub timeout_ms: u64,
}

impl Default for ResolvedReasonerConfig {
    fn default() -> Self {
        Self {
            kind: ReasonerKind::Plan,
            tool: "supervisor".to_string(),
            operation: "decide".to_string(),
            timeout_ms: AgentId::Human.class().default_timeout().as_millis() as u64,
        }
    }
}

/// Resolved configuration with all values set.
/// This is the merged result of global, workspace, local, and CLI configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub supervisor: SupervisorConfig,
    pub timeouts: TimeoutConfig,
    pub process: ProcessConfig,
    pub agents: HashMap<AgentId, AgentBinding>,
    pub bus_capacity: usize,
    pub reasoner: ResolvedReasonerConfig,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            supervisor: SupervisorConfig::default(),
            timeouts: TimeoutConfig::default(),
            process: ProcessConfig::default(),
            agents: AgentId::ALL
                .into_iter()
                .map(|agent| (agent, AgentBinding::default_for(agent)))
                .collect(),
            bus_capacity: DEFAULT_CAPACITY,
            reasoner: ResolvedReasonerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_config_default() {
        let config = WorkspaceConfig::default();
        assert!(config.workflow.is_none());
        assert!(config.workers.is_none());
    }

    #[test]
    fn test_workspace_config_json() {
        let json = r#"{
            "workflow": {"maxIterations": 10, "confidenceThreshold": 0.5},
            "workers": {"research": {"command": "research-worker", "args": ["--stdio"]}},
            "agents": {"generation": {"tool": "codegen", "operation": "generate", "timeoutMs": 1000}},
            "reasoner": {"kind": "worker"}
        }"#;

        let config: WorkspaceConfig = serde_json::from_str(json).unwrap();
        let workflow = config.workflow.unwrap();
        assert_eq!(workflow.max_iterations, Some(10));
        assert_eq!(workflow.error_limit, None);
        assert_eq!(config.workers.unwrap()["research"].args, vec!["--stdio"]);
        assert_eq!(config.agents.unwrap()["generation"].timeout_ms, Some(1000));
        assert_eq!(config.reasoner.unwrap().kind, Some(ReasonerKind::Worker));
    }

    #[test]
    fn test_workspace_config_yaml() {
        let yaml = "defaultCommand: agent-host\nmaxRestarts: 2\nbusCapacity: 64\n";
        let config: WorkspaceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.default_command.as_deref(), Some("agent-host"));
        assert_eq!(config.max_restarts, Some(2));
        assert_eq!(config.bus_capacity, Some(64));

        let round = serde_yaml::to_string(&config).unwrap();
        assert!(round.contains("defaultCommand"));
    }

    #[test]
    fn test_resolved_config_default() {
        let config = ResolvedConfig::default();
        assert_eq!(config.supervisor.max_iterations, 20);
        assert_eq!(config.agents.len(), AgentId::ALL.len());
        assert_eq!(config.agents[&AgentId::Generation].operation, "generate");
        assert_eq!(config.reasoner.kind, ReasonerKind::Plan);
        assert_eq!(config.bus_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_reasoner_kind_parse() {
        assert_eq!("Worker".parse::<ReasonerKind>(), Ok(ReasonerKind::Worker));
        assert!("llm".parse::<ReasonerKind>().is_err());
    }
}
