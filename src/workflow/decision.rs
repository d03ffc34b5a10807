// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The supervisor's verdict for one iteration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::agent::AgentId;
use super::state::Termination;
use crate::error::SupervisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Continue,
    Finish,
    Escalate,
}

/// What the router should do next.
///
/// A terminal decision (`Finish`/`Escalate`) may still name an agent: that
/// agent gets one last dispatch (response formatting or escalation) before
/// the run ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub action: Action,
    pub next_agent: Option<AgentId>,
    pub instructions: String,
    pub confidence: f64,
    pub reasoning: String,
    /// Applied to the state before dispatch.
    pub state_patch: Map<String, Value>,
    /// Set on terminal decisions.
    pub termination: Option<Termination>,
    /// Reasoner failure to record; the router does not dispatch.
    #[serde(skip)]
    pub error: Option<SupervisorError>,
}

impl Decision {
    pub fn continue_with(
        agent: AgentId,
        instructions: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            action: Action::Continue,
            next_agent: Some(agent),
            instructions: instructions.into(),
            confidence,
            reasoning: reasoning.into(),
            state_patch: Map::new(),
            termination: None,
            error: None,
        }
    }

    /// End the run with no further dispatch.
    pub fn finish(termination: Termination, reasoning: impl Into<String>) -> Self {
        Self {
            action: Action::Finish,
            next_agent: None,
            instructions: String::new(),
            confidence: 1.0,
            reasoning: reasoning.into(),
            state_patch: Map::new(),
            termination: Some(termination),
            error: None,
        }
    }

    /// End the run after one response-formatting dispatch.
    pub fn finish_with_response(
        termination: Termination,
        instructions: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            next_agent: Some(AgentId::Response),
            instructions: instructions.into(),
            ..Self::finish(termination, reasoning)
        }
    }

    /// Hand the session to the human-escalation agent and stop.
    pub fn escalate(instructions: impl Into<String>, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            action: Action::Escalate,
            next_agent: Some(AgentId::Human),
            instructions: instructions.into(),
            confidence,
            reasoning: reasoning.into(),
            state_patch: Map::new(),
            termination: Some(Termination::Escalated),
            error: None,
        }
    }

    /// The reasoner could not produce a usable decision.
    pub fn failed(error: SupervisorError) -> Self {
        Self {
            action: Action::Continue,
            next_agent: None,
            instructions: String::new(),
            confidence: 0.0,
            reasoning: error.to_string(),
            state_patch: Map::new(),
            termination: None,
            error: Some(error),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.action != Action::Continue
    }
}
