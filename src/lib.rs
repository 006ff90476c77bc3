// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `resin_logs` - Device log streams from the resin API.
//!
//! This library fetches the log history of a device and follows its live
//! log stream, calling back once per log line.
//!
//! # Features
//!
//! - **History**: One-shot fetch of past log records, optionally limited
//! - **Live logs**: One background consumer per device, started by `subscribe`
//! - **Lifecycle**: `unsubscribe` for one device or all of them
//!
//! # Quick Start
//!
//! ```no_run
//! use resin_logs::{Logs, protocol::ApiConfig};
//!
//! #[tokio::main]
//! async fn main() -> resin_logs::Result<()> {
//!     let logs = Logs::from_config(ApiConfig::default().with_token("my-api-token"))?;
//!
//!     for entry in logs.history_entries("7cf02a6", Some(20)).await? {
//!         println!("{}", entry.message);
//!     }
//!
//!     logs.subscribe_with_errors(
//!         "7cf02a6",
//!         |record| println!("{record}"),
//!         |err| eprintln!("log stream ended: {err}"),
//!     )
//!     .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     logs.unsubscribe_all();
//!     Ok(())
//! }
//! ```
//!
//! # Custom Transports
//!
//! [`Logs`] is generic over [`protocol::Transport`]. The default
//! [`protocol::HttpClient`] uses `reqwest`; disable the `http` feature to
//! bring your own.

pub mod error;
mod logs;
pub mod protocol;
mod record;
pub mod subscription;

pub use error::{Error, ParseError, ProtocolError, Result};
pub use logs::{Logs, SubscribeOutcome};
#[cfg(feature = "http")]
pub use protocol::{ApiConfig, HttpClient};
pub use protocol::{ApiRequest, ApiResponse, Transport};
pub use record::LogEntry;
pub use subscription::{Subscription, SubscriptionState};
