// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Adapters between workflow state and agent workers.
//!
//! An adapter turns the current state plus the supervisor's instructions
//! into one worker call and hands the raw result patch back to the router.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::agent::{AgentClass, AgentId};
use super::state::WorkflowState;
use crate::error::ErrorKind;
use crate::process::{ProcessError, ProcessManager};

/// Why a dispatch produced no patch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Worker returned an invalid patch: {0}")]
    InvalidPatch(String),

    #[error("No adapter registered for agent: {0}")]
    Unregistered(AgentId),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Process(e) => e.kind(),
            Self::InvalidPatch(_) => ErrorKind::Protocol,
            Self::Unregistered(_) => ErrorKind::Supervisor,
        }
    }
}

/// Runs one agent.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    fn agent(&self) -> AgentId;

    /// Execute with `instructions` against `state`, returning the result patch.
    async fn execute(&self, instructions: &str, state: &WorkflowState) -> Result<Value, DispatchError>;
}

/// Per-class call timeouts, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutConfig {
    pub decision_ms: u64,
    pub generation_ms: u64,
    pub default_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            decision_ms: AgentClass::Decision.default_timeout().as_millis() as u64,
            generation_ms: AgentClass::Generation.default_timeout().as_millis() as u64,
            default_ms: AgentClass::Standard.default_timeout().as_millis() as u64,
        }
    }
}

impl TimeoutConfig {
    pub fn for_class(&self, class: AgentClass) -> Duration {
        Duration::from_millis(match class {
            AgentClass::Decision => self.decision_ms,
            AgentClass::Generation => self.generation_ms,
            AgentClass::Standard => self.default_ms,
        })
    }

    pub fn for_agent(&self, agent: AgentId) -> Duration {
        self.for_class(agent.class())
    }
}

/// Which worker tool and operation serve an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBinding {
    pub tool: String,
    pub operation: String,
    /// Overrides the class timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl AgentBinding {
    /// Tool named after the agent, with its default operation.
    pub fn default_for(agent: AgentId) -> Self {
        Self {
            tool: agent.as_str().to_string(),
            operation: agent.default_operation().to_string(),
            timeout_ms: None,
        }
    }
}

/// Adapter that calls a worker through the process manager.
pub struct WorkerAdapter {
    agent: AgentId,
    binding: AgentBinding,
    timeout: Duration,
    manager: Arc<ProcessManager>,
}

impl WorkerAdapter {
    pub fn new(agent: AgentId, binding: AgentBinding, timeout: Duration, manager: Arc<ProcessManager>) -> Self {
        let timeout = binding.timeout_ms.map(Duration::from_millis).unwrap_or(timeout);
        Self {
            agent,
            binding,
            timeout,
            manager,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request params: the instructions plus every artifact present.
    pub fn params(instructions: &str, state: &WorkflowState) -> Value {
        let mut params = Map::new();
        params.insert("instructions".to_string(), Value::String(instructions.to_string()));
        params.insert("userQuery".to_string(), Value::String(state.user_query.clone()));
        params.insert(
            "workspacePath".to_string(),
            Value::String(state.workspace_path.display().to_string()),
        );
        if let Some(passed) = state.validation_passed {
            params.insert("validationPassed".to_string(), Value::Bool(passed));
        }
        params.extend(state.artifacts.to_map());
        Value::Object(params)
    }
}

#[async_trait]
impl AgentAdapter for WorkerAdapter {
    fn agent(&self) -> AgentId {
        self.agent
    }

    async fn execute(&self, instructions: &str, state: &WorkflowState) -> Result<Value, DispatchError> {
        let result = self
            .manager
            .invoke(
                &state.workspace_path,
                &self.binding.tool,
                &self.binding.operation,
                Self::params(instructions, state),
                self.timeout,
            )
            .await?;

        match result {
            Value::Object(_) => Ok(result),
            Value::Null => Ok(Value::Object(Map::new())),
            other => Err(DispatchError::InvalidPatch(format!("expected an object, got {}", other))),
        }
    }
}

/// The adapter for every agent id.
#[derive(Default)]
pub struct AdapterRegistry {
    research: Option<Arc<dyn AgentAdapter>>,
    design: Option<Arc<dyn AgentAdapter>>,
    generation: Option<Arc<dyn AgentAdapter>>,
    validation: Option<Arc<dyn AgentAdapter>>,
    response: Option<Arc<dyn AgentAdapter>>,
    human: Option<Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker adapters for all agents.
    pub fn workers(
        manager: Arc<ProcessManager>,
        bindings: &HashMap<AgentId, AgentBinding>,
        timeouts: &TimeoutConfig,
    ) -> Self {
        let mut registry = Self::new();
        for agent in AgentId::ALL {
            let binding = bindings
                .get(&agent)
                .cloned()
                .unwrap_or_else(|| AgentBinding::default_for(agent));
            registry.register(Arc::new(WorkerAdapter::new(
                agent,
                binding,
                timeouts.for_agent(agent),
                Arc::clone(&manager),
            )));
        }
        registry
    }

    /// Install `adapter` for the agent it reports.
    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        let slot = match adapter.agent() {
            AgentId::Research => &mut self.research,
            AgentId::Design => &mut self.design,
            AgentId::Generation => &mut self.generation,
            AgentId::Validation => &mut self.validation,
            AgentId::Response => &mut self.response,
            AgentId::Human => &mut self.human,
        };
        *slot = Some(adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn AgentAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, agent: AgentId) -> Result<&Arc<dyn AgentAdapter>, DispatchError> {
        let slot = match agent {
            AgentId::Research => &self.research,
            AgentId::Design => &self.design,
            AgentId::Generation => &self.generation,
            AgentId::Validation => &self.validation,
            AgentId::Response => &self.response,
            AgentId::Human => &self.human,
        };
        slot.as_ref().ok_or(DispatchError::Unregistered(agent))
    }
}
