// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device log subscriptions and history.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::protocol::{ApiRequest, ApiResponse, Transport};
use crate::record::LogEntry;
use crate::subscription::{ErrorCallback, RecordCallback, Subscription, SubscriptionState};

#[cfg(feature = "http")]
use crate::protocol::{ApiConfig, HttpClient};

/// Query string that switches the logs endpoint into streaming mode.
const STREAM_QUERY: &str = "stream=1";

/// Result of a [`Logs::subscribe`] call that reached the API successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// A new subscription was registered and started.
    Subscribed,
    /// The device already had a subscription; the new stream was closed
    /// and the existing one kept.
    AlreadySubscribed,
}

/// Registry of live log subscriptions, keyed by device identifier.
///
/// At most one subscription exists per device. The registry is meant to be
/// created once and shared (behind an `Arc` if several tasks need it); all
/// methods take `&self`.
///
/// Dropping the registry stops every subscription it holds.
///
/// # Examples
///
/// ```no_run
/// use resin_logs::{Logs, protocol::ApiConfig};
///
/// #[tokio::main]
/// async fn main() -> resin_logs::Result<()> {
///     let logs = Logs::from_config(ApiConfig::default().with_token("token"))?;
///
///     // Last 10 lines
///     let history = logs.history("7cf02a6", Some(10)).await?;
///     println!("{history}");
///
///     // Live lines
///     logs.subscribe("7cf02a6", |record| println!("{record}")).await?;
///
///     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
///     logs.unsubscribe("7cf02a6");
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Logs<T> {
    transport: T,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

#[cfg(feature = "http")]
impl Logs<HttpClient> {
    /// Creates a registry talking to the API described by `config`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created.
    pub fn from_config(config: ApiConfig) -> Result<Self> {
        Ok(Self::new(config.into_client()?))
    }
}

impl<T: Transport> Logs<T> {
    /// Creates an empty registry over the given transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // =========================================================================
    // Live logs
    // =========================================================================

    /// Subscribes to live logs of a device.
    ///
    /// Opens `GET /device/v2/{device}/logs?stream=1` and, once the response
    /// headers arrive with HTTP 200, starts a background consumer calling
    /// `callback` for every record. Returns as soon as the stream is open.
    ///
    /// If the device already has a subscription the new stream is closed
    /// right away and [`SubscribeOutcome::AlreadySubscribed`] is returned;
    /// the existing callback stays in place.
    ///
    /// Errors that occur after the stream is open end the subscription
    /// silently (they are logged). Use
    /// [`subscribe_with_errors`](Self::subscribe_with_errors) to observe them.
    ///
    /// # Errors
    ///
    /// Returns error if `device` is empty, the request fails, or the API
    /// answers with a status other than 200.
    pub async fn subscribe<F>(&self, device: &str, callback: F) -> Result<SubscribeOutcome>
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
    {
        self.register(device, Arc::new(callback), None).await
    }

    /// Like [`subscribe`](Self::subscribe), with a callback receiving the
    /// error that terminates the stream, if any.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub async fn subscribe_with_errors<F, E>(
        &self,
        device: &str,
        callback: F,
        on_error: E,
    ) -> Result<SubscribeOutcome>
    where
        F: Fn(serde_json::Value) + Send + Sync + 'static,
        E: Fn(Error) + Send + Sync + 'static,
    {
        self.register(device, Arc::new(callback), Some(Arc::new(on_error)))
            .await
    }

    async fn register(
        &self,
        device: &str,
        on_record: RecordCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<SubscribeOutcome> {
        let request = ApiRequest::get(logs_path(device)?)
            .with_query(STREAM_QUERY)
            .streaming();
        let response = self.transport.request(&request).await?;

        if response.status() != 200 {
            let err = response.into_error().await;
            tracing::warn!(device = %device, error = %err, "Log subscription rejected");
            return Err(err.into());
        }

        let mut subscriptions = self.subscriptions.lock();
        match subscriptions.entry(device.to_string()) {
            Entry::Occupied(_) => {
                drop(response);
                tracing::debug!(device = %device, "Already subscribed, closed new stream");
                Ok(SubscribeOutcome::AlreadySubscribed)
            }
            Entry::Vacant(slot) => {
                let mut subscription = Subscription::new(device, response, on_record);
                if let Some(on_error) = on_error {
                    subscription = subscription.with_error_callback(on_error);
                }
                subscription.start();
                slot.insert(subscription);
                tracing::info!(device = %device, "Subscribed to device logs");
                Ok(SubscribeOutcome::Subscribed)
            }
        }
    }

    /// Stops and removes the subscription of a device.
    ///
    /// Returns `true` if a subscription was found. Unknown devices are a
    /// no-op. The consumer is asked to stop but not awaited.
    pub fn unsubscribe(&self, device: &str) -> bool {
        let removed = self.subscriptions.lock().remove(device);
        match removed {
            Some(mut subscription) => {
                subscription.stop();
                tracing::info!(device = %device, "Unsubscribed from device logs");
                true
            }
            None => false,
        }
    }

    /// Stops every subscription and clears the registry.
    ///
    /// Returns the number of subscriptions removed.
    pub fn unsubscribe_all(&self) -> usize {
        let drained: Vec<Subscription> = self
            .subscriptions
            .lock()
            .drain()
            .map(|(_, subscription)| subscription)
            .collect();

        let count = drained.len();
        for mut subscription in drained {
            subscription.stop();
        }
        if count > 0 {
            tracing::info!(count, "Unsubscribed from all device logs");
        }
        count
    }

    /// Removes subscriptions whose consumer already exited.
    ///
    /// A subscription whose stream ended or failed otherwise stays listed
    /// until unsubscribed. Returns the number of entries removed.
    pub fn prune_stopped(&self) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|_, subscription| subscription.state() != SubscriptionState::Stopped);
        before - subscriptions.len()
    }

    /// Returns whether the device has a registered subscription.
    #[must_use]
    pub fn is_subscribed(&self, device: &str) -> bool {
        self.subscriptions.lock().contains_key(device)
    }

    /// Returns the state of the device's subscription, if registered.
    #[must_use]
    pub fn subscription_state(&self, device: &str) -> Option<SubscriptionState> {
        self.subscriptions.lock().get(device).map(Subscription::state)
    }

    /// Returns the registered device identifiers, sorted.
    #[must_use]
    pub fn subscribed_devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.subscriptions.lock().keys().cloned().collect();
        devices.sort_unstable();
        devices
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Returns whether no subscription is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.lock().is_empty()
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Fetches past log records of a device.
    ///
    /// Issues `GET /device/v2/{device}/logs`, adding `count=N` when `count`
    /// is a positive number, and returns the decoded body as is.
    ///
    /// # Errors
    ///
    /// Returns error if `device` is empty, the request fails, the API answers
    /// with a non-success status, or the body is not JSON.
    pub async fn history(&self, device: &str, count: Option<u32>) -> Result<serde_json::Value> {
        self.fetch_history(device, count).await?.json().await
    }

    /// Like [`history`](Self::history), decoding each record as a [`LogEntry`].
    ///
    /// # Errors
    ///
    /// Same as [`history`](Self::history), plus records that do not match
    /// [`LogEntry`].
    pub async fn history_entries(&self, device: &str, count: Option<u32>) -> Result<Vec<LogEntry>> {
        self.fetch_history(device, count).await?.json().await
    }

    async fn fetch_history(&self, device: &str, count: Option<u32>) -> Result<ApiResponse> {
        let mut request = ApiRequest::get(logs_path(device)?);
        if let Some(count) = count.filter(|&count| count > 0) {
            request = request.with_query(format!("count={count}"));
        }

        let response = self.transport.request(&request).await?;
        Ok(response.error_for_status().await?)
    }
}

/// Builds `/device/v2/{device}/logs` with the identifier percent-encoded.
fn logs_path(device: &str) -> Result<String> {
    if device.is_empty() {
        return Err(Error::InvalidDeviceId);
    }
    Ok(format!("/device/v2/{}/logs", urlencoding::encode(device)))
}
