// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background consumers for streaming log responses.
//!
//! A [`Subscription`] owns one open streaming response and forwards every
//! newline-delimited JSON record to a callback from a tokio task. Most
//! callers never build one directly: [`Logs::subscribe`](crate::Logs::subscribe)
//! creates, starts and tracks them per device.
//!
//! # Overview
//!
//! - [`Subscription`] - The consumer itself, with `start`/`stop`
//! - [`SubscriptionState`] - `Created`, `Running` or `Stopped`
//! - [`RecordCallback`] / [`ErrorCallback`] - Shared callback types
//!
//! # Cancellation
//!
//! `stop()` cancels a token that the consumer checks before every read.
//! It does not wait for the task: a callback already executing finishes,
//! but no further records are delivered. The response is dropped when the
//! task exits, which returns the connection to the pool.

mod callback;
mod stream;

pub use callback::{ErrorCallback, RecordCallback, SubscriptionState};
pub use stream::Subscription;
