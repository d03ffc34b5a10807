// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session identity and the ambient context carried across async calls.
//!
//! The router enters a [`SessionContext`] scope for the duration of a
//! workflow run and narrows it with the active agent around each dispatch.
//! Anything running inside that scope (worker calls, reasoners) can recover
//! the session without it being threaded through every signature.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::workflow::AgentId;

/// Identifier of one client session.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get a short representation (first 8 characters).
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.short())
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for SessionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

tokio::task_local! {
    static CURRENT: SessionContext;
}

/// The session (and, during a dispatch, the agent) on whose behalf the
/// current task is running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub agent: Option<AgentId>,
}

impl SessionContext {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            agent: None,
        }
    }

    /// Same session, attributed to `agent`.
    pub fn with_agent(&self, agent: AgentId) -> Self {
        Self {
            session_id: self.session_id.clone(),
            agent: Some(agent),
        }
    }

    /// The context of the enclosing scope, if any.
    pub fn current() -> Option<SessionContext> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Run `fut` with this context installed.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }
}
