// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Supervisor-driven workflow engine.
//!
//! A [`Router`] owns the loop: it asks the [`Supervisor`] for a [`Decision`],
//! dispatches the chosen agent through its [`AgentAdapter`], merges the
//! result patch into the [`WorkflowState`] and repeats until the supervisor
//! returns a terminal decision.

pub mod adapter;
pub mod agent;
pub mod decision;
pub mod reasoner;
pub mod router;
pub mod state;
pub mod supervisor;

pub use adapter::{AdapterRegistry, AgentAdapter, AgentBinding, DispatchError, TimeoutConfig, WorkerAdapter};
pub use agent::{AgentClass, AgentId};
pub use decision::{Action, Decision};
pub use reasoner::{PlanReasoner, Proposal, Reasoner, WorkerReasoner};
pub use router::{OutcomeStatus, Router, WorkflowOutcome};
pub use state::{Artifacts, PatchError, Termination, WorkflowError, WorkflowState};
pub use supervisor::{Supervisor, SupervisorConfig};
