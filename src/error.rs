// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `resin_logs` library.
//!
//! Failures are split between the transport layer ([`ProtocolError`]) and
//! record decoding ([`ParseError`]), both wrapped by the top-level [`Error`].

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while talking to the API.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Error occurred while decoding a log record.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// The device identifier was empty.
    #[error("device identifier must not be empty")]
    InvalidDeviceId,
}

/// Errors related to HTTP communication with the API.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed at the network level.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API returned HTTP {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Authentication failed (HTTP 401).
    #[error("authentication failed: {body}")]
    AuthenticationFailed {
        /// Raw response body.
        body: String,
    },

    /// Invalid API endpoint.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Reading a streaming body failed.
    #[error("stream read failed: {0}")]
    Stream(String),
}

/// Errors related to decoding log records.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A streamed line was not valid UTF-8.
    #[error("invalid UTF-8 in log line: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A streamed line grew past the allowed length without a newline.
    #[error("log line exceeds {limit} bytes")]
    LineTooLong {
        /// Maximum accepted line length in bytes.
        limit: usize,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
