// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Mutable record threaded through one workflow run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::agent::AgentId;
use crate::context::SessionId;
use crate::error::ErrorKind;

/// One failure recorded during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowError {
    pub kind: ErrorKind,
    /// Agent being dispatched, `None` for supervisor failures.
    pub agent: Option<AgentId>,
    pub message: String,
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
}

/// Named outputs produced by agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_files: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_response: Option<Value>,
}

impl Artifacts {
    /// Present artifacts keyed by their wire names.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Whether any artifact has been produced.
    pub fn is_empty(&self) -> bool {
        self.to_map().is_empty()
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Completed,
    ErrorLimit,
    IterationLimit,
    CallCap,
    Escalated,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::ErrorLimit => "error limit reached",
            Self::IterationLimit => "iteration limit reached",
            Self::CallCap => "agent call cap reached",
            Self::Escalated => "escalated to a human",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// State of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub session_id: SessionId,
    pub user_query: String,
    pub workspace_path: PathBuf,
    pub iteration: u32,
    pub last_agent: Option<AgentId>,
    pub agent_call_counts: BTreeMap<AgentId, u32>,
    pub errors: Vec<WorkflowError>,
    pub response_ready: bool,
    pub artifacts: Artifacts,
    /// Verdict of the latest validation, if it reported one.
    pub validation_passed: Option<bool>,
    /// Generated output withheld because it never passed validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantined_files: Option<Value>,
    /// Patches applied so far; stamps below are positions in this sequence.
    #[serde(default)]
    pub patch_seq: u64,
    /// Patch that last produced `generatedFiles`.
    #[serde(default)]
    pub generated_seq: Option<u64>,
    /// Patch in which the validator last produced `validationResults`.
    #[serde(default)]
    pub validated_seq: Option<u64>,
    pub termination: Option<Termination>,
}

impl WorkflowState {
    pub fn new(session_id: SessionId, user_query: impl Into<String>, workspace_path: impl AsRef<Path>) -> Self {
        Self {
            session_id,
            user_query: user_query.into(),
            workspace_path: workspace_path.as_ref().to_path_buf(),
            iteration: 0,
            last_agent: None,
            agent_call_counts: BTreeMap::new(),
            errors: Vec::new(),
            response_ready: false,
            artifacts: Artifacts::default(),
            validation_passed: None,
            quarantined_files: None,
            patch_seq: 0,
            generated_seq: None,
            validated_seq: None,
            termination: None,
        }
    }

    pub fn call_count(&self, agent: AgentId) -> u32 {
        self.agent_call_counts.get(&agent).copied().unwrap_or(0)
    }

    /// Count one dispatch of `agent`; returns the new count.
    pub fn record_call(&mut self, agent: AgentId) -> u32 {
        let count = self.agent_call_counts.entry(agent).or_insert(0);
        *count += 1;
        self.last_agent = Some(agent);
        *count
    }

    pub fn record_error(&mut self, kind: ErrorKind, agent: Option<AgentId>, message: impl Into<String>) {
        self.errors.push(WorkflowError {
            kind,
            agent,
            message: message.into(),
            iteration: self.iteration,
            timestamp: Utc::now(),
        });
    }

    /// Whether non-empty generated output exists.
    pub fn has_generated_files(&self) -> bool {
        self.artifacts.generated_files.as_ref().is_some_and(is_non_empty)
    }

    /// Generated output exists that the validator has not run over since.
    ///
    /// Validation must come from a later patch than the generation it
    /// covers, so output and results delivered together still count as
    /// unvalidated.
    pub fn validation_is_stale(&self) -> bool {
        if !self.has_generated_files() {
            return false;
        }
        match (self.artifacts.validation_results.as_ref(), self.validated_seq, self.generated_seq) {
            (None, _, _) | (_, None, _) => true,
            (Some(_), Some(validated), Some(generated)) => validated <= generated,
            (Some(_), Some(_), None) => false,
        }
    }

    /// Patch moving unvalidated generated output into `quarantinedFiles`.
    pub fn quarantine_patch(&self) -> Option<Map<String, Value>> {
        if !self.validation_is_stale() {
            return None;
        }
        let files = self.artifacts.generated_files.clone()?;
        let mut patch = Map::new();
        patch.insert("quarantinedFiles".to_string(), files);
        patch.insert("generatedFiles".to_string(), Value::Null);
        Some(patch)
    }

    /// Merge a patch that did not come from an agent, such as the
    /// supervisor's own state patch.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<Vec<String>, PatchError> {
        self.merge(None, patch)
    }

    /// Merge the result patch returned by `agent`.
    ///
    /// `validationResults` and `validationPassed` count only when they come
    /// from the validator; other agents' copies are ignored.
    pub fn apply_agent_patch(&mut self, agent: AgentId, patch: &Value) -> Result<Vec<String>, PatchError> {
        self.merge(Some(agent), patch)
    }

    /// Keys must be artifact names or one of `validationPassed`,
    /// `responseReady`, `quarantinedFiles`. A `null` value clears the key.
    /// Unknown keys are ignored. Either every key is applied or none is.
    /// Returns the keys that were applied.
    fn merge(&mut self, source: Option<AgentId>, patch: &Value) -> Result<Vec<String>, PatchError> {
        let Value::Object(map) = patch else {
            return Err(PatchError::NotAnObject(type_name(patch)));
        };
        for key in ["validationPassed", "responseReady"] {
            match map.get(key) {
                None | Some(Value::Null) | Some(Value::Bool(_)) => {}
                Some(other) => return Err(PatchError::InvalidField(key.to_string(), type_name(other))),
            }
        }

        let from_validator = source.map_or(true, |agent| agent == AgentId::Validation);
        self.patch_seq += 1;
        let seq = self.patch_seq;

        let mut applied = Vec::new();
        for (key, value) in map {
            let present = (!value.is_null()).then(|| value.clone());
            match key.as_str() {
                "researchContext" => self.artifacts.research_context = present,
                "architecture" => self.artifacts.architecture = present,
                "generatedFiles" => {
                    self.generated_seq = present.as_ref().map(|_| seq);
                    self.artifacts.generated_files = present;
                }
                "validationResults" | "validationPassed" if !from_validator => {
                    debug!(key = %key, agent = ?source, "Ignoring validation output from a non-validator");
                    continue;
                }
                "validationResults" => {
                    self.validated_seq = present.as_ref().map(|_| seq);
                    if !map.contains_key("validationPassed") {
                        self.validation_passed = present
                            .as_ref()
                            .and_then(|v| v.get("passed"))
                            .and_then(Value::as_bool);
                    }
                    self.artifacts.validation_results = present;
                }
                "userResponse" => {
                    if present.is_some() && !map.contains_key("responseReady") {
                        self.response_ready = true;
                    }
                    self.artifacts.user_response = present;
                }
                "validationPassed" => self.validation_passed = value.as_bool(),
                "responseReady" => self.response_ready = value.as_bool().unwrap_or(false),
                "quarantinedFiles" => self.quarantined_files = present,
                other => {
                    debug!(key = other, "Ignoring unknown patch key");
                    continue;
                }
            }
            applied.push(key.clone());
        }
        Ok(applied)
    }
}

/// A result patch that could not be applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("Result patch must be an object, got {0}")]
    NotAnObject(&'static str),

    #[error("Patch field {0} has invalid type {1}")]
    InvalidField(String, &'static str),
}

fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(m) => !m.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state() -> WorkflowState {
        WorkflowState::new(SessionId::from("s"), "add a cache", "/ws")
    }

    #[test]
    fn test_new_state_is_empty() {
        let state = state();
        assert_eq!(state.iteration, 0);
        assert!(state.artifacts.is_empty());
        assert!(!state.response_ready);
        assert_eq!(state.call_count(AgentId::Research), 0);
    }

    #[test]
    fn test_record_call_updates_counts() {
        let mut state = state();
        assert_eq!(state.record_call(AgentId::Design), 1);
        assert_eq!(state.record_call(AgentId::Design), 2);
        assert_eq!(state.call_count(AgentId::Design), 2);
        assert_eq!(state.last_agent, Some(AgentId::Design));
    }

    #[test]
    fn test_apply_artifact_patch() {
        let mut state = state();
        let applied = state
            .apply_patch(&json!({"researchContext": {"files": 3}, "bogus": 1}))
            .unwrap();
        assert_eq!(applied, vec!["researchContext"]);
        assert_eq!(state.artifacts.research_context, Some(json!({"files": 3})));
    }

    #[test]
    fn test_validation_staleness_follows_patch_order() {
        let mut state = state();
        state.iteration = 2;
        state.apply_patch(&json!({"generatedFiles": {"a.rs": "x"}})).unwrap();
        assert!(state.validation_is_stale());

        state.iteration = 3;
        state
            .apply_patch(&json!({"validationResults": {"passed": false}}))
            .unwrap();
        assert!(!state.validation_is_stale());
        assert_eq!(state.validation_passed, Some(false));

        state.iteration = 4;
        state.apply_patch(&json!({"generatedFiles": {"a.rs": "y"}})).unwrap();
        assert!(state.validation_is_stale());

        state.iteration = 5;
        state
            .apply_patch(&json!({"validationResults": {"issues": []}, "validationPassed": true}))
            .unwrap();
        assert!(!state.validation_is_stale());
        assert_eq!(state.validation_passed, Some(true));
    }

    #[test]
    fn test_results_delivered_with_generation_stay_stale() {
        let mut state = state();
        state.iteration = 2;
        state
            .apply_patch(&json!({"generatedFiles": {"a.rs": "x"}, "validationResults": {"passed": true}}))
            .unwrap();
        assert!(state.validation_is_stale());

        let mut state = self::state();
        let applied = state
            .apply_agent_patch(
                AgentId::Generation,
                &json!({
                    "generatedFiles": {"a.rs": "x"},
                    "validationResults": {"passed": true},
                    "validationPassed": true
                }),
            )
            .unwrap();
        assert_eq!(applied, vec!["generatedFiles"]);
        assert!(state.validation_is_stale());
        assert!(state.artifacts.validation_results.is_none());
        assert_eq!(state.validation_passed, None);
    }

    #[test]
    fn test_only_the_validator_clears_staleness() {
        let mut state = state();
        state
            .apply_agent_patch(AgentId::Generation, &json!({"generatedFiles": {"a.rs": "x"}}))
            .unwrap();
        state
            .apply_agent_patch(AgentId::Response, &json!({"validationResults": {"passed": true}}))
            .unwrap();
        assert!(state.validation_is_stale());

        state
            .apply_agent_patch(AgentId::Validation, &json!({"validationResults": {"passed": true}}))
            .unwrap();
        assert!(!state.validation_is_stale());
        assert_eq!(state.validation_passed, Some(true));
        assert!(state.quarantine_patch().is_none());
    }

    #[test]
    fn test_quarantine_patch_moves_stale_output() {
        let mut state = state();
        state.apply_patch(&json!({"generatedFiles": {"a.rs": "x"}})).unwrap();

        let patch = state.quarantine_patch().unwrap();
        state.apply_patch(&Value::Object(patch)).unwrap();
        assert!(state.artifacts.generated_files.is_none());
        assert_eq!(state.quarantined_files, Some(json!({"a.rs": "x"})));
        assert!(state.quarantine_patch().is_none());
    }

    #[test]
    fn test_rejected_patch_leaves_state_untouched() {
        let mut state = state();
        let before = state.clone();
        assert_eq!(
            state.apply_patch(&json!({"architecture": "x", "validationPassed": "yes"})),
            Err(PatchError::InvalidField("validationPassed".to_string(), "string"))
        );
        assert_eq!(state, before);
        assert!(state.artifacts.architecture.is_none());
    }

    #[test]
    fn test_empty_generated_files_need_no_validation() {
        let mut state = state();
        state.apply_patch(&json!({"generatedFiles": {}})).unwrap();
        assert!(!state.has_generated_files());
        assert!(!state.validation_is_stale());
    }

    #[test]
    fn test_user_response_sets_response_ready() {
        let mut state = state();
        state.apply_patch(&json!({"userResponse": "done"})).unwrap();
        assert!(state.response_ready);

        let mut state = self::state();
        state
            .apply_patch(&json!({"userResponse": "draft", "responseReady": false}))
            .unwrap();
        assert!(!state.response_ready);
    }

    #[test]
    fn test_null_clears_artifact() {
        let mut state = state();
        state.apply_patch(&json!({"generatedFiles": {"a": 1}})).unwrap();
        state
            .apply_patch(&json!({"generatedFiles": null, "quarantinedFiles": {"a": 1}}))
            .unwrap();
        assert!(state.artifacts.generated_files.is_none());
        assert_eq!(state.quarantined_files, Some(json!({"a": 1})));
        assert!(!state.validation_is_stale());
    }

    #[test]
    fn test_invalid_patches() {
        let mut state = state();
        assert_eq!(
            state.apply_patch(&json!([1, 2])),
            Err(PatchError::NotAnObject("array"))
        );
        assert!(matches!(
            state.apply_patch(&json!({"responseReady": "yes"})),
            Err(PatchError::InvalidField(ref k, "string")) if k == "responseReady"
        ));
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let mut state = state();
        state.record_call(AgentId::Research);
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["userQuery"], "add a cache");
        assert_eq!(value["agentCallCounts"]["research"], 1);
        assert_eq!(value["responseReady"], false);
    }
}
