// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport layer for talking to the resin API.
//!
//! The rest of the library only needs one capability from HTTP: issue a
//! `GET` for a path and query, optionally as a streaming request, and hand
//! back the status and body. That capability is the [`Transport`] trait.
//!
//! # Implementations
//!
//! - [`HttpClient`]: `reqwest`-based transport (feature `http`, enabled by default)
//!
//! Any other type implementing [`Transport`] can be plugged into
//! [`Logs`](crate::Logs), which is how the registry is tested without a
//! network.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{ApiConfig, HttpClient};

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;

use crate::error::{Error, ParseError, ProtocolError};

/// Most bytes of an error body kept in [`ProtocolError::Api`].
const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// Longest wait for an error body before giving up on the rest of it.
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(2);

/// A boxed stream of body chunks as they arrive from the network.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProtocolError>> + Send>>;

/// A `GET` request relative to the configured API endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    path: String,
    query: Option<String>,
    streaming: bool,
}

impl ApiRequest {
    /// Creates a buffered `GET` request for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: None,
            streaming: false,
        }
    }

    /// Sets the raw query string (without the leading `?`).
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Marks the request as streaming: the body is consumed incrementally.
    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns whether the body should be streamed.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Returns the path with the query string appended.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }
}

/// Body of an [`ApiResponse`].
pub enum ResponseBody {
    /// The whole body, already read.
    Buffered(Bytes),
    /// A body still arriving from the network.
    Streaming(ByteStream),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

impl ResponseBody {
    /// Reads at most [`ERROR_BODY_LIMIT`] bytes, waiting at most
    /// [`ERROR_BODY_TIMEOUT`] for a streaming body. Whatever arrived is kept.
    async fn read_bounded(self) -> String {
        let mut buffer = match self {
            Self::Buffered(bytes) => bytes.to_vec(),
            Self::Streaming(mut stream) => {
                let mut buffer = Vec::new();
                let read = async {
                    while buffer.len() < ERROR_BODY_LIMIT {
                        match stream.next().await {
                            Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                            Some(Err(_)) | None => break,
                        }
                    }
                };
                if tokio::time::timeout(ERROR_BODY_TIMEOUT, read).await.is_err() {
                    tracing::debug!(read = buffer.len(), "Error body still open, truncating");
                }
                buffer
            }
        };
        buffer.truncate(ERROR_BODY_LIMIT);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Response returned by a [`Transport`].
///
/// Dropping the response (or a [`LineStream`] made from it) closes the
/// underlying connection.
#[derive(Debug)]
pub struct ApiResponse {
    status: u16,
    body: ResponseBody,
}

impl ApiResponse {
    /// Creates a response from its parts.
    #[must_use]
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self { status, body }
    }

    /// Creates a response with an already-read body.
    #[must_use]
    pub fn buffered(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(status, ResponseBody::Buffered(body.into()))
    }

    /// Creates a response whose body is read from `stream`.
    #[must_use]
    pub fn streaming<S>(status: u16, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ProtocolError>> + Send + 'static,
    {
        Self::new(status, ResponseBody::Streaming(Box::pin(stream)))
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reads the whole body.
    ///
    /// # Errors
    ///
    /// Returns error if reading a streaming body fails.
    pub async fn bytes(self) -> Result<Bytes, ProtocolError> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(mut stream) => {
                let mut buffer = Vec::new();
                while let Some(chunk) = stream.next().await {
                    buffer.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(buffer))
            }
        }
    }

    /// Reads the whole body as text, replacing invalid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns error if reading a streaming body fails.
    pub async fn text(self) -> Result<String, ProtocolError> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads the whole body and decodes it as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be read or is not valid JSON for `T`.
    pub async fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ParseError::Json(e).into())
    }

    /// Turns a non-success response into an error carrying the raw body.
    ///
    /// The body is read up to 64 KiB, and a streaming body for at most two
    /// seconds, so a stream that never ends cannot stall the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::AuthenticationFailed`] for HTTP 401 and
    /// [`ProtocolError::Api`] for any other non-2xx status.
    pub async fn error_for_status(self) -> Result<Self, ProtocolError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error().await)
        }
    }

    /// Consumes the response into the error describing its status.
    pub(crate) async fn into_error(self) -> ProtocolError {
        let status = self.status;
        let body = self.body.read_bounded().await;
        if status == 401 {
            ProtocolError::AuthenticationFailed { body }
        } else {
            ProtocolError::Api { status, body }
        }
    }

    /// Turns the body into a stream of lines.
    #[must_use]
    pub fn into_lines(self) -> LineStream {
        match self.body {
            ResponseBody::Buffered(bytes) => {
                LineStream::new(Box::pin(stream::once(async move {
                    Ok::<_, ProtocolError>(bytes)
                })))
            }
            ResponseBody::Streaming(stream) => LineStream::new(stream),
        }
    }
}

/// Newline-delimited view over a [`ByteStream`].
///
/// Chunk boundaries are opaque: a line may span several chunks and a chunk
/// may hold several lines. A trailing `\r` is stripped. An unterminated
/// last line is yielded when the stream ends.
///
/// A line longer than [`LineStream::DEFAULT_MAX_LINE_LENGTH`] (or the limit
/// set with [`with_max_line_length`](LineStream::with_max_line_length)) ends
/// the stream with [`ParseError::LineTooLong`].
pub struct LineStream {
    inner: ByteStream,
    buffer: Vec<u8>,
    // Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    max_line_length: usize,
    finished: bool,
}

impl fmt::Debug for LineStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineStream")
            .field("buffered", &self.buffer.len())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl LineStream {
    /// Default limit for a single line, newline excluded.
    pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

    /// Wraps a byte stream.
    #[must_use]
    pub fn new(inner: ByteStream) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            scanned: 0,
            max_line_length: Self::DEFAULT_MAX_LINE_LENGTH,
            finished: false,
        }
    }

    /// Sets the longest accepted line, in bytes.
    #[must_use]
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Returns the next complete line, or `None` once the stream is exhausted.
    ///
    /// Cancel safe: the internal buffer is only touched after a chunk has
    /// been received.
    pub async fn next_line(&mut self) -> Option<crate::Result<String>> {
        loop {
            let unscanned = &self.buffer[self.scanned..];
            if let Some(offset) = unscanned.iter().position(|&b| b == b'\n') {
                let pos = self.scanned + offset;
                self.scanned = 0;
                if pos > self.max_line_length {
                    return Some(self.overflow());
                }
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                return Some(decode_line(line));
            }
            self.scanned = self.buffer.len();

            if self.buffer.len() > self.max_line_length {
                return Some(self.overflow());
            }

            if self.finished {
                if self.buffer.is_empty() {
                    return None;
                }
                self.scanned = 0;
                return Some(decode_line(std::mem::take(&mut self.buffer)));
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.finished = true;
                    self.buffer.clear();
                    self.scanned = 0;
                    return Some(Err(e.into()));
                }
                None => self.finished = true,
            }
        }
    }

    /// Drops the oversized line and ends the stream.
    fn overflow(&mut self) -> crate::Result<String> {
        self.finished = true;
        self.buffer.clear();
        self.scanned = 0;
        Err(Error::Parse(ParseError::LineTooLong {
            limit: self.max_line_length,
        }))
    }
}

fn decode_line(mut line: Vec<u8>) -> crate::Result<String> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|e| Error::Parse(ParseError::Utf8(e)))
}

/// The single capability the library needs from an HTTP client.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Performs a `GET` request against the API.
    ///
    /// Implementations return the response whatever its status; status
    /// handling is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the request cannot be issued or the
    /// response headers are never received.
    async fn request(&self, request: &ApiRequest) -> Result<ApiResponse, ProtocolError>;
}
