// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use crate::error::ConfigError;
use crate::workflow::AgentId;

use super::types::{ReasonerKind, ResolvedConfig, WorkspaceConfig};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub max_iterations: Option<u32>,
    pub error_limit: Option<usize>,
    pub confidence_threshold: Option<f64>,
    pub per_agent_cap: Option<u32>,
    pub worker_command: Option<String>,
    pub max_restarts: Option<u32>,
    pub reasoner: Option<ReasonerKind>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.conductor.local.json)
/// 3. Workspace config (.conductor.json)
/// 4. Global config (~/.conductor/config.json)
/// 5. Default values
pub fn merge_config(
    global: Option<WorkspaceConfig>,
    workspace: Option<WorkspaceConfig>,
    local: Option<WorkspaceConfig>,
    cli: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_workspace_config(&mut result, &config)?;
    }

    // Apply CLI options (highest precedence)
    apply_cli_options(&mut result, &cli);

    validate(&result)?;
    Ok(result)
}

fn apply_workspace_config(result: &mut ResolvedConfig, config: &WorkspaceConfig) -> Result<(), ConfigError> {
    if let Some(ref workflow) = config.workflow {
        if let Some(limit) = workflow.error_limit {
            result.supervisor.error_limit = limit;
        }
        if let Some(max) = workflow.max_iterations {
            result.supervisor.max_iterations = max;
        }
        if let Some(threshold) = workflow.confidence_threshold {
            result.supervisor.confidence_threshold = threshold;
        }
        if let Some(cap) = workflow.per_agent_cap {
            result.supervisor.per_agent_cap = cap;
        }
    }

    if let Some(ref timeouts) = config.timeouts {
        if let Some(ms) = timeouts.decision_ms {
            result.timeouts.decision_ms = ms;
        }
        if let Some(ms) = timeouts.generation_ms {
            result.timeouts.generation_ms = ms;
        }
        if let Some(ms) = timeouts.default_ms {
            result.timeouts.default_ms = ms;
        }
    }

    if let Some(ref workers) = config.workers {
        // Later layers replace whole worker entries.
        for (tool, spec) in workers {
            let mut spec = spec.clone();
            if spec.name.is_empty() {
                spec.name = tool.clone();
            }
            result.process.workers.insert(tool.clone(), spec);
        }
    }

    if config.default_command.is_some() {
        result.process.default_command = config.default_command.clone();
    }

    if let Some(max) = config.max_restarts {
        result.process.max_restarts = max;
    }

    if let Some(ref agents) = config.agents {
        for (name, binding) in agents {
            let agent: AgentId = name.parse().map_err(|_| ConfigError::InvalidValue {
                field: format!("agents.{}", name),
                message: "unknown agent".to_string(),
            })?;
            result.agents.insert(agent, binding.clone());
        }
    }

    if let Some(capacity) = config.bus_capacity {
        result.bus_capacity = capacity;
    }

    if let Some(ref reasoner) = config.reasoner {
        if let Some(kind) = reasoner.kind {
            result.reasoner.kind = kind;
        }
        if let Some(ref tool) = reasoner.tool {
            result.reasoner.tool = tool.clone();
        }
        if let Some(ref operation) = reasoner.operation {
            result.reasoner.operation = operation.clone();
        }
        if let Some(ms) = reasoner.timeout_ms {
            result.reasoner.timeout_ms = ms;
        }
    }

    Ok(())
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: &CliOptions) {
    if let Some(max) = cli.max_iterations {
        result.supervisor.max_iterations = max;
    }

    if let Some(limit) = cli.error_limit {
        result.supervisor.error_limit = limit;
    }

    if let Some(threshold) = cli.confidence_threshold {
        result.supervisor.confidence_threshold = threshold;
    }

    if let Some(cap) = cli.per_agent_cap {
        result.supervisor.per_agent_cap = cap;
    }

    if cli.worker_command.is_some() {
        result.process.default_command = cli.worker_command.clone();
    }

    if let Some(max) = cli.max_restarts {
        result.process.max_restarts = max;
    }

    if let Some(kind) = cli.reasoner {
        result.reasoner.kind = kind;
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Reject values the workflow cannot run with.
pub fn validate(config: &ResolvedConfig) -> Result<(), ConfigError> {
    let threshold = config.supervisor.confidence_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        return Err(invalid("workflow.confidenceThreshold", "must be between 0 and 1"));
    }
    if config.supervisor.max_iterations == 0 {
        return Err(invalid("workflow.maxIterations", "must be at least 1"));
    }
    if config.supervisor.per_agent_cap == 0 {
        return Err(invalid("workflow.perAgentCap", "must be at least 1"));
    }
    if config.bus_capacity == 0 {
        return Err(invalid("busCapacity", "must be at least 1"));
    }
    for (tool, spec) in &config.process.workers {
        if spec.command.trim().is_empty() {
            return Err(invalid(&format!("workers.{}.command", tool), "must not be empty"));
        }
    }
    Ok(())
}
