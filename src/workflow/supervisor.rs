// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The decision function that picks the next step of a workflow.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. a ready response finishes the run;
//! 2. too many errors finish the run;
//! 3. too many iterations finish the run;
//! 4. generated output that was never validated is sent to validation;
//! 5. otherwise the reasoner proposes an agent, and a low-confidence or
//!    capped proposal is escalated instead.
//!
//! Every terminal decision taken while generated output is still
//! unvalidated moves that output into `quarantinedFiles`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::agent::AgentId;
use super::decision::Decision;
use super::reasoner::Reasoner;
use super::state::{Termination, WorkflowState};
use crate::error::SupervisorError;

/// Workflow limits. All four are tunable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorConfig {
    /// More errors than this finish the run.
    pub error_limit: usize,
    /// Iterations past this finish the run.
    pub max_iterations: u32,
    /// Proposals below this confidence are escalated.
    pub confidence_threshold: f64,
    /// Dispatches allowed per agent per session.
    pub per_agent_cap: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            error_limit: 3,
            max_iterations: 20,
            confidence_threshold: 0.7,
            per_agent_cap: 3,
        }
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    reasoner: Arc<dyn Reasoner>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, reasoner: Arc<dyn Reasoner>) -> Self {
        Self { config, reasoner }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Decide the next step for `state`. Never fails; reasoner problems come
    /// back as a decision carrying an error.
    pub async fn decide(&self, state: &WorkflowState) -> Decision {
        let decision = self.evaluate(state).await;
        let decision = quarantine_unvalidated(decision, state);
        debug!(
            action = ?decision.action,
            next_agent = ?decision.next_agent,
            confidence = decision.confidence,
            iteration = state.iteration,
            "Supervisor decision"
        );
        decision
    }

    /// Agents still under their call cap, in pipeline order.
    pub fn available_agents(&self, state: &WorkflowState) -> Vec<AgentId> {
        AgentId::ALL
            .into_iter()
            .filter(|a| self.is_available(state, *a))
            .collect()
    }

    fn is_available(&self, state: &WorkflowState, agent: AgentId) -> bool {
        state.call_count(agent) < self.config.per_agent_cap
    }

    async fn evaluate(&self, state: &WorkflowState) -> Decision {
        if state.response_ready {
            return Decision::finish(Termination::Completed, "response is ready");
        }

        if state.errors.len() > self.config.error_limit {
            return self.wrap_up(
                state,
                Termination::ErrorLimit,
                failure_instructions(state),
                format!("{} errors exceed the limit of {}", state.errors.len(), self.config.error_limit),
            );
        }

        if state.iteration > self.config.max_iterations {
            return self.wrap_up(
                state,
                Termination::IterationLimit,
                format!(
                    "The workflow timed out after {} iterations. Summarize the partial progress for the user.",
                    state.iteration
                ),
                format!("iteration {} exceeds the limit of {}", state.iteration, self.config.max_iterations),
            );
        }

        if state.validation_is_stale() {
            if self.is_available(state, AgentId::Validation) {
                return Decision::continue_with(
                    AgentId::Validation,
                    "Validate the generated files",
                    1.0,
                    "generated output has not been validated",
                );
            }
            return self.wrap_up(
                state,
                Termination::CallCap,
                "Generated files could not be validated and were withheld. Explain this to the user.",
                "validator reached its call cap with unvalidated output",
            );
        }

        let available = self.available_agents(state);
        if available.is_empty() {
            return Decision::finish(Termination::CallCap, "every agent reached its call cap");
        }

        let proposal = match self.reasoner.propose(state, &available).await {
            Ok(p) => p,
            Err(e) => {
                warn!(reasoner = self.reasoner.name(), error = %e, "Reasoner failed");
                return Decision::failed(e);
            }
        };

        if !(0.0..=1.0).contains(&proposal.confidence) {
            return Decision::failed(SupervisorError::InvalidConfidence(proposal.confidence));
        }

        let agent = match proposal.agent.parse::<AgentId>() {
            Ok(agent) => agent,
            Err(e) => return Decision::failed(e),
        };

        if proposal.confidence < self.config.confidence_threshold {
            return self.escalate_or_finish(
                state,
                proposal.confidence,
                format!(
                    "confidence {:.2} in {} is below {:.2}: {}",
                    proposal.confidence, agent, self.config.confidence_threshold, proposal.reasoning
                ),
            );
        }

        if !self.is_available(state, agent) {
            return self.escalate_or_finish(
                state,
                proposal.confidence,
                format!("{} has reached its call cap", agent),
            );
        }

        if agent == AgentId::Human {
            return Decision::escalate(proposal.instructions, proposal.confidence, proposal.reasoning);
        }

        Decision::continue_with(agent, proposal.instructions, proposal.confidence, proposal.reasoning)
    }

    /// Finish, formatting a final answer if the response agent is still allowed.
    fn wrap_up(
        &self,
        state: &WorkflowState,
        termination: Termination,
        instructions: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Decision {
        if self.is_available(state, AgentId::Response) {
            Decision::finish_with_response(termination, instructions, reasoning)
        } else {
            Decision::finish(termination, reasoning)
        }
    }

    fn escalate_or_finish(&self, state: &WorkflowState, confidence: f64, reasoning: String) -> Decision {
        if self.is_available(state, AgentId::Human) {
            Decision::escalate(
                format!("Ask the user for guidance on: {}", state.user_query),
                confidence,
                reasoning,
            )
        } else {
            self.wrap_up(
                state,
                Termination::CallCap,
                "The workflow could not make further progress. Summarize what was done for the user.",
                format!("{}; escalation unavailable", reasoning),
            )
        }
    }
}

fn failure_instructions(state: &WorkflowState) -> String {
    let mut text = format!(
        "The workflow stopped after {} errors. Explain what was attempted and what failed:",
        state.errors.len()
    );
    for err in &state.errors {
        let agent = err.agent.map(|a| a.as_str()).unwrap_or("supervisor");
        text.push_str(&format!("\n- [{}] {}: {}", err.kind, agent, err.message));
    }
    text
}

fn quarantine_unvalidated(mut decision: Decision, state: &WorkflowState) -> Decision {
    if !decision.is_terminal() {
        return decision;
    }
    if let Some(patch) = state.quarantine_patch() {
        decision.state_patch.extend(patch);
        decision.reasoning.push_str("; unvalidated output quarantined");
    }
    decision
}
