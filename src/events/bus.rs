// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session-scoped publish/subscribe for progress events.
//!
//! Each session gets its own bounded broadcast channel. Publishing never
//! waits: a subscriber that falls behind loses its oldest undelivered events
//! and the loss is counted, and events for sessions nobody listens to are
//! dropped on the floor. A session's channel is forgotten once its last
//! subscription is gone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, trace, warn};

use super::types::ProgressEvent;
use crate::context::SessionId;

/// Default per-session buffer.
pub const DEFAULT_CAPACITY: usize = 256;

/// Routes progress events to the subscribers of their session.
#[derive(Debug)]
pub struct EventBus {
    sessions: RwLock<HashMap<SessionId, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose per-session buffers hold `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribe to every future event of `session`.
    pub fn subscribe(&self, session: &SessionId) -> Subscription {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|id, tx| id == session || tx.receiver_count() > 0);
        let sender = sessions
            .entry(session.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Subscription {
            session: session.clone(),
            rx: sender.subscribe(),
            dropped: 0,
        }
    }

    /// Deliver `event` to the subscribers of its session.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        let session = event.session_id.clone();
        let sent = {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            let Some(sender) = sessions.get(&session) else {
                trace!(session = %session.short(), "No subscribers; dropping event");
                return 0;
            };
            sender.send(event)
        };

        match sent {
            Ok(receivers) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                receivers
            }
            Err(_) => {
                self.prune(&session);
                0
            }
        }
    }

    /// Forget `session` if every subscription to it has been dropped.
    fn prune(&self, session: &SessionId) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        if sessions.get(session).is_some_and(|tx| tx.receiver_count() == 0) {
            sessions.remove(session);
            trace!(session = %session.short(), "Last subscriber gone; channel released");
        }
    }

    /// Forget a session; its subscriptions end once drained.
    pub fn close_session(&self, session: &SessionId) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(session);
        if removed.is_some() {
            debug!(session = %session.short(), "Closed event stream");
        }
    }

    /// Number of sessions with a live channel.
    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Total events delivered to at least one subscriber.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Total events lost by lagging subscribers.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_dropped(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to one session's events.
pub struct Subscription {
    session: SessionId,
    rx: broadcast::Receiver<ProgressEvent>,
    dropped: u64,
}

impl Subscription {
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Events this subscriber missed by falling behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Wait for the next event. `None` once the session is closed.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => self.lagged(n),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => self.lagged(n),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Like [`recv`](Self::recv), but lag is also reported to `bus`.
    pub async fn recv_counted(&mut self, bus: &EventBus) -> Option<ProgressEvent> {
        let before = self.dropped;
        let event = self.recv().await;
        if self.dropped > before {
            bus.record_dropped(self.dropped - before);
        }
        event
    }

    /// Consume the subscription as a stream.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }

    fn lagged(&mut self, n: u64) {
        self.dropped += n;
        warn!(session = %self.session.short(), dropped = n, "Subscriber lagged; oldest events dropped");
        #[cfg(feature = "telemetry")]
        crate::telemetry::GLOBAL_METRICS.record_dropped_events(n);
    }
}
