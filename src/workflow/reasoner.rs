// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pluggable policies that propose the next agent.
//!
//! The supervisor only consults a reasoner once its hard rules have passed,
//! and always constrains it to the agents that are still under their call cap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::agent::AgentId;
use super::state::WorkflowState;
use crate::error::SupervisorError;
use crate::process::ProcessManager;

/// A reasoner's raw suggestion, before the supervisor validates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// Agent id as emitted; parsed by the supervisor.
    pub agent: String,
    pub instructions: String,
    pub confidence: f64,
    pub reasoning: String,
}

impl Proposal {
    pub fn new(agent: AgentId, instructions: impl Into<String>, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            agent: agent.as_str().to_string(),
            instructions: instructions.into(),
            confidence,
            reasoning: reasoning.into(),
        }
    }

    /// Parse a `{nextAgent, instructions, confidence, reasoning}` object.
    pub fn from_value(value: &Value) -> Result<Self, SupervisorError> {
        let obj = value
            .as_object()
            .ok_or_else(|| SupervisorError::InvalidDecision(format!("expected an object, got {}", value)))?;

        let agent = obj
            .get("nextAgent")
            .or_else(|| obj.get("agent"))
            .and_then(Value::as_str)
            .ok_or_else(|| SupervisorError::InvalidDecision("missing nextAgent".to_string()))?;

        let confidence = obj
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| SupervisorError::InvalidDecision("missing numeric confidence".to_string()))?;

        let text = |key: &str| obj.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        Ok(Self {
            agent: agent.to_string(),
            instructions: text("instructions"),
            confidence,
            reasoning: text("reasoning"),
        })
    }
}

/// Proposes the next agent for a workflow.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Suggest one of `available` for `state`.
    async fn propose(&self, state: &WorkflowState, available: &[AgentId]) -> Result<Proposal, SupervisorError>;
}

/// Deterministic policy driven by which artifacts are still missing.
///
/// Walks the pipeline (research, design, generation, response) and proposes
/// the first step whose artifact is absent. A failed validation sends the
/// work back to generation. When the preferred step is capped the next
/// available one is proposed with lower confidence.
#[derive(Debug, Default, Clone)]
pub struct PlanReasoner;

impl PlanReasoner {
    const PREFERRED: f64 = 0.9;
    const FALLBACK: f64 = 0.75;
    const LAST_RESORT: f64 = 0.5;

    fn plan(state: &WorkflowState) -> Vec<(AgentId, &'static str)> {
        let a = &state.artifacts;
        let mut steps = Vec::new();

        if state.validation_passed == Some(false) && state.has_generated_files() {
            steps.push((AgentId::Generation, "Fix the issues reported by validation"));
        }
        if a.research_context.is_none() {
            steps.push((AgentId::Research, "Gather context for the request"));
        }
        if a.architecture.is_none() {
            steps.push((AgentId::Design, "Design the change"));
        }
        if a.generated_files.is_none() {
            steps.push((AgentId::Generation, "Generate the implementation"));
        }
        steps.push((AgentId::Response, "Summarize the work for the user"));
        steps
    }
}

#[async_trait]
impl Reasoner for PlanReasoner {
    fn name(&self) -> &str {
        "plan"
    }

    async fn propose(&self, state: &WorkflowState, available: &[AgentId]) -> Result<Proposal, SupervisorError> {
        let plan = Self::plan(state);

        for (idx, (agent, instructions)) in plan.iter().enumerate() {
            if !available.contains(agent) {
                continue;
            }
            let (confidence, reasoning) = match idx {
                0 => (Self::PREFERRED, format!("next step in plan: {}", agent)),
                _ if *agent == AgentId::Response => (
                    Self::LAST_RESORT,
                    "earlier steps are exhausted; answering with what exists".to_string(),
                ),
                _ => (Self::FALLBACK, format!("skipping capped step; moving on to {}", agent)),
            };
            let instructions = format!("{}: {}", instructions, state.user_query);
            return Ok(Proposal::new(*agent, instructions, confidence, reasoning));
        }

        Err(SupervisorError::ReasonerFailed(
            "no planned step is available".to_string(),
        ))
    }
}

/// Asks an out-of-process `supervisor` worker to decide.
pub struct WorkerReasoner {
    manager: Arc<ProcessManager>,
    tool: String,
    operation: String,
    timeout: Duration,
}

impl WorkerReasoner {
    pub fn new(manager: Arc<ProcessManager>, timeout: Duration) -> Self {
        Self {
            manager,
            tool: "supervisor".to_string(),
            operation: "decide".to_string(),
            timeout,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>, operation: impl Into<String>) -> Self {
        self.tool = tool.into();
        self.operation = operation.into();
        self
    }

    fn params(state: &WorkflowState, available: &[AgentId]) -> Value {
        let errors: Vec<&str> = state.errors.iter().map(|e| e.message.as_str()).collect();
        json!({
            "userQuery": state.user_query,
            "iteration": state.iteration,
            "lastAgent": state.last_agent,
            "availableAgents": available,
            "agentCallCounts": state.agent_call_counts,
            "artifacts": state.artifacts.to_map(),
            "validationPassed": state.validation_passed,
            "errors": errors,
        })
    }
}

#[async_trait]
impl Reasoner for WorkerReasoner {
    fn name(&self) -> &str {
        &self.tool
    }

    async fn propose(&self, state: &WorkflowState, available: &[AgentId]) -> Result<Proposal, SupervisorError> {
        let result = self
            .manager
            .invoke(
                &state.workspace_path,
                &self.tool,
                &self.operation,
                Self::params(state, available),
                self.timeout,
            )
            .await
            .map_err(|e| SupervisorError::ReasonerFailed(e.to_string()))?;

        Proposal::from_value(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionId;
    use serde_json::json;

    fn state() -> WorkflowState {
        WorkflowState::new(SessionId::from("s"), "build a parser", "/ws")
    }

    #[tokio::test]
    async fn test_plan_starts_with_research() {
        let proposal = PlanReasoner.propose(&state(), &AgentId::ALL).await.unwrap();
        assert_eq!(proposal.agent, "research");
        assert!(proposal.confidence >= 0.7);
        assert!(proposal.instructions.contains("build a parser"));
    }

    #[tokio::test]
    async fn test_plan_follows_missing_artifacts() {
        let mut state = state();
        state.apply_patch(&json!({"researchContext": {}, "architecture": {}})).unwrap();
        let proposal = PlanReasoner.propose(&state, &AgentId::ALL).await.unwrap();
        assert_eq!(proposal.agent, "generation");
    }

    #[tokio::test]
    async fn test_plan_regenerates_after_failed_validation() {
        let mut state = state();
        state
            .apply_patch(&json!({
                "researchContext": {},
                "architecture": {},
                "generatedFiles": {"a.rs": ""},
                "validationResults": {"passed": false}
            }))
            .unwrap();
        let proposal = PlanReasoner.propose(&state, &AgentId::ALL).await.unwrap();
        assert_eq!(proposal.agent, "generation");
        assert!(proposal.instructions.starts_with("Fix"));
    }

    #[tokio::test]
    async fn test_plan_skips_capped_steps() {
        let available = [AgentId::Design, AgentId::Response, AgentId::Human];
        let proposal = PlanReasoner.propose(&state(), &available).await.unwrap();
        assert_eq!(proposal.agent, "design");
        assert_eq!(proposal.confidence, PlanReasoner::FALLBACK);

        let proposal = PlanReasoner.propose(&state(), &[AgentId::Response]).await.unwrap();
        assert_eq!(proposal.agent, "response");
        assert!(proposal.confidence < 0.7);

        assert!(PlanReasoner.propose(&state(), &[AgentId::Validation]).await.is_err());
    }

    #[test]
    fn test_proposal_from_value() {
        let p = Proposal::from_value(&json!({
            "nextAgent": "design",
            "instructions": "sketch it",
            "confidence": 0.8,
            "reasoning": "research is done"
        }))
        .unwrap();
        assert_eq!(p.agent, "design");
        assert_eq!(p.confidence, 0.8);

        assert!(matches!(
            Proposal::from_value(&json!({"nextAgent": "design"})),
            Err(SupervisorError::InvalidDecision(_))
        ));
        assert!(matches!(
            Proposal::from_value(&json!("design")),
            Err(SupervisorError::InvalidDecision(_))
        ));
    }
}
