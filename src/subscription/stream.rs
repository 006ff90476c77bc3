// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Consumer task for one streaming log response.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ParseError, Result};
use crate::protocol::ApiResponse;

use super::callback::{ErrorCallback, RecordCallback, SubscriptionState};

/// A background consumer bound to one streaming response and one callback.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use resin_logs::protocol::{ApiConfig, ApiRequest, Transport};
/// use resin_logs::subscription::Subscription;
///
/// # async fn example() -> resin_logs::Result<()> {
/// let client = ApiConfig::default().into_client()?;
/// let request = ApiRequest::get("/device/v2/abc/logs")
///     .with_query("stream=1")
///     .streaming();
/// let response = client.request(&request).await?;
///
/// let mut subscription = Subscription::new("abc", response, Arc::new(|record: serde_json::Value| {
///     println!("{record}");
/// }));
/// subscription.start();
///
/// // Later
/// subscription.stop();
/// # Ok(())
/// # }
/// ```
pub struct Subscription {
    device: String,
    response: Option<ApiResponse>,
    on_record: RecordCallback,
    on_error: Option<ErrorCallback>,
    state: Arc<Mutex<SubscriptionState>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("device", &self.device)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Wraps an open response. Nothing is read until [`start`](Self::start).
    #[must_use]
    pub fn new(device: impl Into<String>, response: ApiResponse, on_record: RecordCallback) -> Self {
        Self {
            device: device.into(),
            response: Some(response),
            on_record,
            on_error: None,
            state: Arc::new(Mutex::new(SubscriptionState::Created)),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets a callback receiving the error that ends the consumer, if any.
    #[must_use]
    pub fn with_error_callback(mut self, on_error: ErrorCallback) -> Self {
        self.on_error = Some(on_error);
        self
    }

    /// Returns the device identifier.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        *self.state.lock()
    }

    /// Returns whether the consumer task is still reading.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SubscriptionState::Running
    }

    /// Spawns the consumer task. Does nothing unless the state is `Created`.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn start(&mut self) {
        {
            let mut state = self.state.lock();
            if *state != SubscriptionState::Created {
                return;
            }
            *state = SubscriptionState::Running;
        }

        let Some(response) = self.response.take() else {
            return;
        };

        tracing::debug!(device = %self.device, "Starting log consumer");

        tokio::spawn(consume(
            self.device.clone(),
            response,
            Arc::clone(&self.on_record),
            self.on_error.clone(),
            Arc::clone(&self.state),
            self.cancel.clone(),
        ));
    }

    /// Requests the consumer to stop and releases the response.
    ///
    /// Idempotent, and safe after the consumer already exited. Does not
    /// wait for the task to finish.
    pub fn stop(&mut self) {
        self.response = None;
        self.cancel.cancel();
        *self.state.lock() = SubscriptionState::Stopped;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn consume(
    device: String,
    response: ApiResponse,
    on_record: RecordCallback,
    on_error: Option<ErrorCallback>,
    state: Arc<Mutex<SubscriptionState>>,
    cancel: CancellationToken,
) {
    let outcome = read_records(response, &on_record, &cancel).await;
    *state.lock() = SubscriptionState::Stopped;

    match outcome {
        Ok(()) => tracing::debug!(device = %device, "Log consumer finished"),
        Err(err) => {
            tracing::warn!(device = %device, error = %err, "Log consumer terminated");
            if let Some(on_error) = on_error {
                on_error(err);
            }
        }
    }
}

/// Reads lines until end of stream, cancellation, or the first error.
async fn read_records(
    response: ApiResponse,
    on_record: &RecordCallback,
    cancel: &CancellationToken,
) -> Result<()> {
    if response.status() != 200 {
        return tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(()),
            err = response.into_error() => Err(err.into()),
        };
    }

    let mut lines = response.into_lines();
    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line,
        };

        let Some(line) = line else {
            return Ok(());
        };
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let record: serde_json::Value = serde_json::from_str(&line).map_err(ParseError::Json)?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        on_record(record);
    }
}
