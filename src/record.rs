// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed view of a device log record.
//!
//! The registry hands raw [`serde_json::Value`]s to callbacks. [`LogEntry`]
//! is an opt-in decoding of the fields the API is known to send; anything
//! else is kept in [`LogEntry::extra`].

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, Result};

/// One log line emitted by a device or its supervisor.
///
/// # Examples
///
/// ```
/// use resin_logs::LogEntry;
///
/// let value = serde_json::json!({
///     "message": "Service started",
///     "timestamp": 1_500_000_000_000_u64,
///     "isSystem": true,
/// });
/// let entry = LogEntry::from_value(value).unwrap();
/// assert_eq!(entry.message, "Service started");
/// assert_eq!(entry.is_system, Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// The log text.
    pub message: String,
    /// Device-side time, in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Time the API stored the line, in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// Whether the line comes from the device supervisor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_system: Option<bool>,
    /// Whether the line was written to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_std_err: Option<bool>,
    /// Identifier of the emitting service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<u64>,
    /// Any other fields present on the record.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LogEntry {
    /// Decodes a raw record as received by a subscription callback.
    ///
    /// # Errors
    ///
    /// Returns error if the value is not an object with a string `message`.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ParseError::Json(e).into())
    }
}
