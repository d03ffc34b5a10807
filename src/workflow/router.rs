// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The loop that drives one workflow from request to final state.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::adapter::{AdapterRegistry, DispatchError};
use super::agent::AgentId;
use super::decision::Decision;
use super::state::{Termination, WorkflowState};
use super::supervisor::Supervisor;
use crate::context::SessionContext;
use crate::error::ErrorKind;
use crate::events::{EventBus, Phase, ProgressEvent};
use crate::telemetry::AgentSpan;

/// Executes workflows by alternating supervisor decisions and dispatches.
pub struct Router {
    supervisor: Supervisor,
    adapters: AdapterRegistry,
    bus: Arc<EventBus>,
}

impl Router {
    pub fn new(supervisor: Supervisor, adapters: AdapterRegistry, bus: Arc<EventBus>) -> Self {
        Self {
            supervisor,
            adapters,
            bus,
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Run `state` to completion.
    pub async fn run(&self, state: WorkflowState) -> WorkflowState {
        self.run_until_cancelled(state, &CancellationToken::new()).await
    }

    /// Run `state` until it terminates or `cancel` fires.
    ///
    /// Cancellation is observed between iterations; a dispatch already in
    /// flight runs to completion or timeout.
    #[instrument(skip_all, fields(session = %state.session_id.short()))]
    pub async fn run_until_cancelled(&self, state: WorkflowState, cancel: &CancellationToken) -> WorkflowState {
        let context = SessionContext::new(state.session_id.clone());
        context.scope(self.drive(state, cancel)).await
    }

    async fn drive(&self, mut state: WorkflowState, cancel: &CancellationToken) -> WorkflowState {
        info!(query = %state.user_query, workspace = %state.workspace_path.display(), "Workflow started");

        loop {
            if cancel.is_cancelled() {
                info!(iteration = state.iteration, "Workflow cancelled");
                seal_unvalidated(&mut state);
                state.termination = Some(Termination::Cancelled);
                break;
            }

            self.publish(&state, None, Phase::Think, "Choosing the next step");
            let decision = self.supervisor.decide(&state).await;

            if !decision.state_patch.is_empty() {
                if let Err(e) = state.apply_patch(&Value::Object(decision.state_patch.clone())) {
                    state.record_error(ErrorKind::Supervisor, None, e.to_string());
                }
            }

            match (&decision.error, decision.next_agent) {
                (Some(err), _) => {
                    warn!(iteration = state.iteration, error = %err, "Supervisor could not decide");
                    state.record_error(err.kind(), None, err.to_string());
                }
                (None, Some(agent)) => self.dispatch(&mut state, agent, &decision).await,
                (None, None) if !decision.is_terminal() => {
                    state.record_error(
                        ErrorKind::Supervisor,
                        None,
                        "decision to continue named no agent",
                    );
                }
                (None, None) => {
                    self.publish(&state, None, Phase::Decision, decision.reasoning.clone());
                }
            }

            state.iteration += 1;

            if decision.is_terminal() {
                // The finishing agent's patch may have brought back unvalidated output.
                seal_unvalidated(&mut state);

                let termination = decision.termination.unwrap_or(Termination::Completed);
                info!(
                    iteration = state.iteration,
                    termination = %termination,
                    errors = state.errors.len(),
                    "Workflow finished"
                );
                state.termination = Some(termination);
                break;
            }
        }

        state
    }

    async fn dispatch(&self, state: &mut WorkflowState, agent: AgentId, decision: &Decision) {
        let calls = state.record_call(agent);
        self.publish(state, Some(agent), Phase::Decision, decision.instructions.clone());

        let span = AgentSpan::start(agent, state.iteration);
        let started = Instant::now();

        let result = match self.adapters.get(agent) {
            Ok(adapter) => {
                let context = SessionContext::new(state.session_id.clone()).with_agent(agent);
                context.scope(adapter.execute(&decision.instructions, state)).await
            }
            Err(e) => Err(e),
        };

        let outcome = result.and_then(|patch| {
            state
                .apply_agent_patch(agent, &patch)
                .map_err(|e| DispatchError::InvalidPatch(e.to_string()))
        });
        let duration_ms = started.elapsed().as_millis() as u64;

        let message = match &outcome {
            Ok(keys) => {
                info!(agent = %agent, calls, duration_ms, updated = ?keys, "Agent completed");
                format!("{} completed", agent)
            }
            Err(e) => {
                warn!(agent = %agent, calls, duration_ms, error = %e, "Agent failed");
                state.record_error(e.kind(), Some(agent), e.to_string());
                format!("{} failed: {}", agent, e)
            }
        };
        span.finish(outcome.as_ref().err().map(|e| e.kind()));

        let event = ProgressEvent::new(
            state.session_id.clone(),
            Some(agent),
            Phase::Result,
            message,
            self.progress(state),
        )
        .with_duration(duration_ms);
        self.bus.publish(event);
    }

    fn publish(&self, state: &WorkflowState, agent: Option<AgentId>, phase: Phase, message: impl Into<String>) {
        self.bus.publish(ProgressEvent::new(
            state.session_id.clone(),
            agent,
            phase,
            message,
            self.progress(state),
        ));
    }

    /// Rough completion estimate from the iteration budget.
    fn progress(&self, state: &WorkflowState) -> f64 {
        let budget = self.supervisor.config().max_iterations.max(1) as f64;
        (state.iteration as f64 / budget).min(1.0)
    }
}

/// Quarantine generated output that a run is about to end with unvalidated.
fn seal_unvalidated(state: &mut WorkflowState) {
    if let Some(patch) = state.quarantine_patch() {
        warn!(iteration = state.iteration, "Run ending with unvalidated output; quarantining");
        if let Err(e) = state.apply_patch(&Value::Object(patch)) {
            state.record_error(ErrorKind::Supervisor, None, e.to_string());
        }
    }
}

/// Final status reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Partial,
    Error,
}

/// A finished run, reduced to what the client sees.
#[derive(Debug, Clone)]
pub struct WorkflowOutcome {
    pub status: OutcomeStatus,
    pub content: String,
    pub termination: Termination,
    pub state: WorkflowState,
}

impl WorkflowOutcome {
    pub fn from_state(state: WorkflowState) -> Self {
        let termination = state.termination.unwrap_or(Termination::Completed);
        let response = state.artifacts.user_response.as_ref().and_then(|v| match v {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())),
        });

        let (status, content) = match response {
            Some(content) if termination == Termination::Completed => (OutcomeStatus::Success, content),
            Some(content) => (OutcomeStatus::Partial, content),
            None => (OutcomeStatus::Error, summarize(&state, termination)),
        };

        Self {
            status,
            content,
            termination,
            state,
        }
    }
}

fn summarize(state: &WorkflowState, termination: Termination) -> String {
    let mut text = format!(
        "Workflow ended ({}) after {} iterations with no response.",
        termination, state.iteration
    );
    if let Some(last) = state.errors.last() {
        text.push_str(&format!(
            " {} error(s) recorded; last: {}",
            state.errors.len(),
            last.message
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionId;
    use crate::workflow::adapter::AgentAdapter;
    use crate::workflow::reasoner::PlanReasoner;
    use crate::workflow::supervisor::SupervisorConfig;
    use async_trait::async_trait;
    use serde_json::json;

    /// Returns a fixed patch and remembers the session context it ran under.
    struct Stub {
        agent: AgentId,
        patch: Value,
        seen: std::sync::Mutex<Vec<Option<SessionContext>>>,
    }

    impl Stub {
        fn new(agent: AgentId, patch: Value) -> Arc<Self> {
            Arc::new(Self {
                agent,
                patch,
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AgentAdapter for Stub {
        fn agent(&self) -> AgentId {
            self.agent
        }

        async fn execute(&self, _: &str, _: &WorkflowState) -> Result<Value, DispatchError> {
            self.seen.lock().unwrap().push(SessionContext::current());
            Ok(self.patch.clone())
        }
    }

    fn happy_registry() -> (AdapterRegistry, Arc<Stub>) {
        let research = Stub::new(AgentId::Research, json!({"researchContext": {"files": 2}}));
        let registry = AdapterRegistry::new()
            .with(research.clone())
            .with(Stub::new(AgentId::Design, json!({"architecture": "modules"})))
            .with(Stub::new(AgentId::Generation, json!({"generatedFiles": {"lib.rs": "x"}})))
            .with(Stub::new(
                AgentId::Validation,
                json!({"validationResults": {"issues": []}, "validationPassed": true}),
            ))
            .with(Stub::new(AgentId::Response, json!({"userResponse": "All done"})))
            .with(Stub::new(AgentId::Human, json!({"userResponse": "Need help"})));
        (registry, research)
    }

    fn router(registry: AdapterRegistry, bus: Arc<EventBus>) -> Router {
        let supervisor = Supervisor::new(SupervisorConfig::default(), Arc::new(PlanReasoner));
        Router::new(supervisor, registry, bus)
    }

    #[tokio::test]
    async fn test_happy_path_runs_pipeline() {
        let bus = Arc::new(EventBus::new());
        let (registry, research) = happy_registry();
        let router = router(registry, Arc::clone(&bus));

        let state = WorkflowState::new(SessionId::from("happy"), "add caching", "/ws");
        let final_state = router.run(state).await;

        assert_eq!(final_state.termination, Some(Termination::Completed));
        assert!(final_state.errors.is_empty());
        for agent in [
            AgentId::Research,
            AgentId::Design,
            AgentId::Generation,
            AgentId::Validation,
            AgentId::Response,
        ] {
            assert_eq!(final_state.call_count(agent), 1, "{}", agent);
        }
        // Five dispatches plus the finishing pass.
        assert_eq!(final_state.iteration, 6);

        let seen = research.seen.lock().unwrap();
        let ctx = seen[0].as_ref().unwrap();
        assert_eq!(ctx.session_id.as_str(), "happy");
        assert_eq!(ctx.agent, Some(AgentId::Research));

        let outcome = WorkflowOutcome::from_state(final_state);
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.content, "All done");
    }

    #[tokio::test]
    async fn test_events_bracket_each_dispatch() {
        let bus = Arc::new(EventBus::new());
        let session = SessionId::from("events");
        let mut sub = bus.subscribe(&session);
        let (registry, _) = happy_registry();

        router(registry, Arc::clone(&bus))
            .run(WorkflowState::new(session, "q", "/ws"))
            .await;

        let mut phases = Vec::new();
        while let Some(event) = sub.try_recv() {
            phases.push((event.phase, event.agent));
        }
        let research_start = phases
            .iter()
            .position(|p| *p == (Phase::Decision, Some(AgentId::Research)))
            .unwrap();
        assert_eq!(phases[research_start + 1], (Phase::Result, Some(AgentId::Research)));
        assert_eq!(phases[0], (Phase::Think, None));
    }

    #[tokio::test]
    async fn test_missing_adapter_is_recorded_not_fatal() {
        let bus = Arc::new(EventBus::new());
        let router = router(AdapterRegistry::new(), bus);

        let final_state = router.run(WorkflowState::new(SessionId::from("s"), "q", "/ws")).await;

        assert_eq!(final_state.termination, Some(Termination::ErrorLimit));
        assert_eq!(final_state.errors.len(), 5);
        assert!(final_state.errors.iter().all(|e| e.kind == ErrorKind::Supervisor));

        let outcome = WorkflowOutcome::from_state(final_state);
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.content.contains("error limit reached"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let bus = Arc::new(EventBus::new());
        let (registry, _) = happy_registry();
        let router = router(registry, bus);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let final_state = router
            .run_until_cancelled(WorkflowState::new(SessionId::from("s"), "q", "/ws"), &cancel)
            .await;
        assert_eq!(final_state.termination, Some(Termination::Cancelled));
        assert_eq!(final_state.iteration, 0);
    }

    #[tokio::test]
    async fn test_finishing_agent_cannot_return_unvalidated_output() {
        let bus = Arc::new(EventBus::new());
        let registry = AdapterRegistry::new().with(Stub::new(
            AgentId::Response,
            json!({"userResponse": "partial", "generatedFiles": {"b.rs": "y"}}),
        ));
        let router = router(registry, bus);

        let mut state = WorkflowState::new(SessionId::from("late-files"), "q", "/ws");
        state.iteration = 21;
        let final_state = router.run(state).await;

        assert_eq!(final_state.termination, Some(Termination::IterationLimit));
        assert_eq!(final_state.call_count(AgentId::Response), 1);
        assert!(final_state.artifacts.generated_files.is_none());
        assert_eq!(final_state.quarantined_files, Some(json!({"b.rs": "y"})));
        assert!(!final_state.validation_is_stale());
        assert_eq!(final_state.artifacts.user_response, Some(json!("partial")));
    }

    #[tokio::test]
    async fn test_generation_cannot_validate_itself() {
        let bus = Arc::new(EventBus::new());
        let validation = Stub::new(
            AgentId::Validation,
            json!({"validationResults": {"issues": []}, "validationPassed": true}),
        );
        let registry = AdapterRegistry::new()
            .with(Stub::new(AgentId::Research, json!({"researchContext": {"files": 2}})))
            .with(Stub::new(AgentId::Design, json!({"architecture": "modules"})))
            .with(Stub::new(
                AgentId::Generation,
                json!({"generatedFiles": {"lib.rs": "x"}, "validationResults": {"issues": []}}),
            ))
            .with(validation.clone())
            .with(Stub::new(AgentId::Response, json!({"userResponse": "All done"})));
        let router = router(registry, bus);

        let final_state = router.run(WorkflowState::new(SessionId::from("self-check"), "q", "/ws")).await;

        assert_eq!(final_state.termination, Some(Termination::Completed));
        assert_eq!(final_state.call_count(AgentId::Validation), 1);
        assert_eq!(validation.seen.lock().unwrap().len(), 1);
        assert!(final_state.artifacts.generated_files.is_some());
        assert!(final_state.quarantined_files.is_none());
    }

    #[test]
    fn test_outcome_partial_for_early_stop_with_content() {
        let mut state = WorkflowState::new(SessionId::from("s"), "q", "/ws");
        state.apply_patch(&json!({"userResponse": {"summary": "half"}})).unwrap();
        state.termination = Some(Termination::IterationLimit);

        let outcome = WorkflowOutcome::from_state(state);
        assert_eq!(outcome.status, OutcomeStatus::Partial);
        assert!(outcome.content.contains("half"));
    }
}
