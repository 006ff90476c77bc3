// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback types and lifecycle state for log subscriptions.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;

/// Callback invoked once per decoded log record.
///
/// The value is passed through as decoded; its shape is not validated.
pub type RecordCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Callback invoked once if a running subscription dies with an error.
pub type ErrorCallback = Arc<dyn Fn(Error) + Send + Sync>;

/// Lifecycle of a [`Subscription`](super::Subscription).
///
/// Transitions only move forward: `Created` to `Running` on start, and
/// either of those to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Constructed, consumer not spawned yet.
    Created,
    /// Consumer task is reading the stream.
    Running,
    /// Stream ended, failed, or was stopped.
    Stopped,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
