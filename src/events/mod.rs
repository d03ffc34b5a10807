// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress event bus.

mod bus;
mod types;

pub use bus::{EventBus, Subscription, DEFAULT_CAPACITY};
pub use types::{Phase, ProgressEvent};
