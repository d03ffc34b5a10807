// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! End-to-end workflows: router, supervisor, process manager and fake workers.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{happy_script, pipeline_result, runtime, test_config, Reply};
use conductor::config::ReasonerKind;
use conductor::error::ErrorKind;
use conductor::events::Phase;
use conductor::process::WorkerStatus;
use conductor::workflow::{
    Action, OutcomeStatus, PlanReasoner, Supervisor, SupervisorConfig, Termination, WorkflowOutcome,
};
use conductor::{AgentId, SessionId, WorkflowState};

fn state(query: &str) -> WorkflowState {
    let workspace = std::env::temp_dir();
    WorkflowState::new(SessionId::new(), query, workspace)
}

#[tokio::test]
async fn test_first_decision_on_empty_state_is_research() {
    let supervisor = Supervisor::new(SupervisorConfig::default(), Arc::new(PlanReasoner));
    let decision = supervisor.decide(&state("add a --verbose flag")).await;

    assert_eq!(decision.action, Action::Continue);
    assert_eq!(decision.next_agent, Some(AgentId::Research));
}

#[tokio::test]
async fn test_happy_path_validates_before_finishing() {
    let (runtime, launcher) = runtime(&test_config(), happy_script());

    let finished = runtime.router.run(state("add a --verbose flag")).await;
    let outcome = WorkflowOutcome::from_state(finished);

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.content, "Added the --verbose flag.");
    assert!(outcome.state.errors.is_empty());
    assert!(outcome.state.artifacts.generated_files.is_some());
    assert!(outcome.state.artifacts.validation_results.is_some());
    assert_eq!(outcome.state.validation_passed, Some(true));

    for tool in ["research", "design", "generation", "validation", "response"] {
        assert_eq!(launcher.calls(tool), 1, "{} should run once", tool);
    }
    assert_eq!(launcher.calls("human"), 0);

    let workers = runtime.manager.handles().await;
    assert_eq!(workers.len(), 5);
    assert!(workers.iter().all(|w| w.status == WorkerStatus::Ready));
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_single_timeout_is_recorded_and_retried() {
    let mut config = test_config();
    config.timeouts.default_ms = 150;
    let script = Arc::new(|tool: &str, req: &conductor::rpc::Request, nth: usize| {
        if tool == "research" && nth == 0 {
            Reply::Hang
        } else {
            Reply::Ok(pipeline_result(&req.method))
        }
    });
    let (runtime, launcher) = runtime(&config, script);

    let outcome = WorkflowOutcome::from_state(runtime.router.run(state("add a flag")).await);

    assert_eq!(outcome.state.errors.len(), 1);
    let error = &outcome.state.errors[0];
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert_eq!(error.agent, Some(AgentId::Research));

    assert!(outcome.state.artifacts.research_context.is_some());
    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(launcher.calls("research"), 2);
    assert_eq!(launcher.launches("research"), 1);
}

#[tokio::test]
async fn test_iteration_limit_ends_partial() {
    let mut config = test_config();
    config.supervisor.per_agent_cap = 100;
    let script = Arc::new(|_: &str, req: &conductor::rpc::Request, _: usize| match req.method.as_str() {
        "format_response" => Reply::Ok(json!({"userResponse": "still drafting", "responseReady": false})),
        method => Reply::Ok(pipeline_result(method)),
    });
    let (runtime, _launcher) = runtime(&config, script);

    let outcome = WorkflowOutcome::from_state(runtime.router.run(state("never done")).await);

    assert_eq!(outcome.termination, Termination::IterationLimit);
    assert_eq!(outcome.status, OutcomeStatus::Partial);
    assert_eq!(outcome.content, "still drafting");
    assert!(outcome.state.iteration > config.supervisor.max_iterations);
    assert!(!outcome.state.response_ready);
}

#[tokio::test]
async fn test_low_confidence_escalates_to_human() {
    let mut config = test_config();
    config.reasoner.kind = ReasonerKind::Worker;
    let script = Arc::new(|_: &str, req: &conductor::rpc::Request, _: usize| match req.method.as_str() {
        "decide" => Reply::Ok(json!({
            "nextAgent": "design",
            "instructions": "Design it",
            "confidence": 0.4,
            "reasoning": "requirements are ambiguous"
        })),
        method => Reply::Ok(pipeline_result(method)),
    });
    let (runtime, launcher) = runtime(&config, script);

    let outcome = WorkflowOutcome::from_state(runtime.router.run(state("make it better")).await);

    assert_eq!(outcome.termination, Termination::Escalated);
    assert_eq!(outcome.status, OutcomeStatus::Partial);
    assert_eq!(launcher.calls("supervisor"), 1);
    assert_eq!(launcher.calls("human"), 1);
    assert_eq!(launcher.calls("design"), 0);
    assert_eq!(outcome.state.call_count(AgentId::Human), 1);
}

#[tokio::test]
async fn test_error_limit_finishes_without_content() {
    let script = Arc::new(|tool: &str, _: &conductor::rpc::Request, _: usize| {
        Reply::Fail(format!("{} is broken", tool))
    });
    let (runtime, _launcher) = runtime(&test_config(), script);

    let outcome = WorkflowOutcome::from_state(runtime.router.run(state("anything")).await);

    assert_eq!(outcome.termination, Termination::ErrorLimit);
    assert_eq!(outcome.status, OutcomeStatus::Error);
    assert!(outcome.state.errors.len() > 3);
    assert!(outcome.state.errors.iter().all(|e| e.kind == ErrorKind::Worker));
    assert!(outcome.content.contains("error limit reached"));
}

#[tokio::test]
async fn test_per_agent_cap_is_never_exceeded() {
    let script = Arc::new(|tool: &str, req: &conductor::rpc::Request, _: usize| {
        if tool == "research" {
            Reply::Fail("index unavailable".to_string())
        } else {
            Reply::Ok(pipeline_result(&req.method))
        }
    });
    let mut config = test_config();
    config.supervisor.error_limit = 10;
    let (runtime, launcher) = runtime(&config, script);

    let outcome = WorkflowOutcome::from_state(runtime.router.run(state("cap research")).await);

    assert_eq!(launcher.calls("research"), 3);
    assert_eq!(outcome.state.call_count(AgentId::Research), 3);
    for agent in AgentId::ALL {
        assert!(outcome.state.call_count(agent) <= config.supervisor.per_agent_cap);
    }
}

#[tokio::test]
async fn test_crashed_worker_is_relaunched_once() {
    let script = Arc::new(|tool: &str, req: &conductor::rpc::Request, nth: usize| {
        if tool == "research" && nth == 0 {
            Reply::Die
        } else {
            Reply::Ok(pipeline_result(&req.method))
        }
    });
    let (runtime, launcher) = runtime(&test_config(), script);

    let outcome = WorkflowOutcome::from_state(runtime.router.run(state("restart me")).await);

    assert_eq!(launcher.launches("research"), 2);
    assert_eq!(outcome.state.errors.len(), 1);
    assert_eq!(outcome.state.errors[0].kind, ErrorKind::Transport);
    assert_eq!(outcome.status, OutcomeStatus::Success);
}

#[tokio::test]
async fn test_second_crash_exhausts_restart_budget() {
    let script = Arc::new(|tool: &str, req: &conductor::rpc::Request, _: usize| {
        if tool == "research" {
            Reply::Die
        } else {
            Reply::Ok(pipeline_result(&req.method))
        }
    });
    let mut config = test_config();
    config.supervisor.error_limit = 10;
    let (runtime, launcher) = runtime(&config, script);

    let outcome = WorkflowOutcome::from_state(runtime.router.run(state("keep crashing")).await);

    assert_eq!(launcher.launches("research"), 2);
    let research: Vec<_> = outcome
        .state
        .errors
        .iter()
        .filter(|e| e.agent == Some(AgentId::Research))
        .map(|e| e.kind)
        .collect();
    assert_eq!(research, vec![ErrorKind::Transport, ErrorKind::Transport, ErrorKind::Worker]);
    assert_eq!(
        runtime.manager.health(&std::env::temp_dir(), "research").await,
        Some(WorkerStatus::Crashed)
    );
}

#[tokio::test]
async fn test_progress_events_are_ordered_and_attributed() {
    let (runtime, _launcher) = runtime(&test_config(), happy_script());
    let state = state("watch progress");
    let mut subscription = runtime.bus.subscribe(&state.session_id);
    let session = state.session_id.clone();

    runtime.router.run(state).await;
    runtime.bus.close_session(&session);

    let mut events = Vec::new();
    while let Some(event) = subscription.recv().await {
        events.push(event);
    }
    assert!(events.iter().all(|e| e.session_id == session));

    let research: Vec<Phase> = events
        .iter()
        .filter(|e| e.agent == Some(AgentId::Research))
        .map(|e| e.phase)
        .collect();
    assert_eq!(research, vec![Phase::Decision, Phase::Progress, Phase::Result]);

    let progress = events
        .iter()
        .find(|e| e.phase == Phase::Progress)
        .unwrap();
    assert_eq!(progress.message, "research working");
    assert_eq!(progress.progress, 0.5);
    assert_eq!(subscription.dropped(), 0);
}
