// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client-facing sessions.
//!
//! A session binds one client to a workspace and runs its requests through
//! the [`Router`](crate::workflow::Router) one at a time:
//!
//! ```text
//! client ──init/message──▶ SessionService ──spawn──▶ Router.run
//!   ▲                            │                        │
//!   └──── OutboundEvent ◀── forwarder ◀── EventBus ◀──────┘
//! ```

mod protocol;
mod server;
mod service;

pub use protocol::{InboundMessage, OutboundEvent};
pub use server::serve;
pub use service::{OutboundSender, SessionService};
