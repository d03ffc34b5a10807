// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The fixed set of agents the router can dispatch to.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;

/// Identifier of a dispatchable agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    /// Gathers context about the workspace and query.
    Research,
    /// Produces an architecture for the change.
    Design,
    /// Writes the generated files.
    Generation,
    /// Checks generated files.
    Validation,
    /// Formats the final user-facing answer.
    Response,
    /// Hands the session back to a human.
    Human,
}

/// Timeout class of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentClass {
    Decision,
    Generation,
    Standard,
}

impl AgentId {
    /// Every agent, in pipeline order.
    pub const ALL: [AgentId; 6] = [
        AgentId::Research,
        AgentId::Design,
        AgentId::Generation,
        AgentId::Validation,
        AgentId::Response,
        AgentId::Human,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Design => "design",
            Self::Generation => "generation",
            Self::Validation => "validation",
            Self::Response => "response",
            Self::Human => "human",
        }
    }

    pub fn class(&self) -> AgentClass {
        match self {
            Self::Human => AgentClass::Decision,
            Self::Design | Self::Generation => AgentClass::Generation,
            Self::Research | Self::Validation | Self::Response => AgentClass::Standard,
        }
    }

    /// Worker operation invoked when no binding overrides it.
    pub fn default_operation(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Design => "design",
            Self::Generation => "generate",
            Self::Validation => "validate",
            Self::Response => "format_response",
            Self::Human => "escalate",
        }
    }

    /// State artifact this agent is expected to fill in.
    pub fn artifact(&self) -> Option<&'static str> {
        match self {
            Self::Research => Some("researchContext"),
            Self::Design => Some("architecture"),
            Self::Generation => Some("generatedFiles"),
            Self::Validation => Some("validationResults"),
            Self::Response | Self::Human => Some("userResponse"),
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentId {
    type Err = SupervisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "research" | "researcher" => Ok(Self::Research),
            "design" | "architect" | "architecture" => Ok(Self::Design),
            "generation" | "generate" | "codegen" | "code_generation" => Ok(Self::Generation),
            "validation" | "validate" | "validator" | "review" => Ok(Self::Validation),
            "response" | "formatter" | "response_formatter" => Ok(Self::Response),
            "human" | "escalation" | "human_escalation" => Ok(Self::Human),
            _ => Err(SupervisorError::UnknownAgent(s.to_string())),
        }
    }
}

impl AgentClass {
    /// Built-in timeout for the class.
    pub fn default_timeout(&self) -> Duration {
        match self {
            Self::Decision => Duration::from_secs(30),
            Self::Generation => Duration::from_secs(300),
            Self::Standard => Duration::from_secs(60),
        }
    }
}
