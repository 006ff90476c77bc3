// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP transport backed by `reqwest`.

use std::time::Duration;

use futures::TryStreamExt;
use reqwest::Client;

use crate::error::ProtocolError;
use crate::protocol::{ApiRequest, ApiResponse, Transport};

// ============================================================================
// ApiConfig - Endpoint and authentication settings
// ============================================================================

/// Configuration for reaching the resin API.
///
/// # Examples
///
/// ```
/// use resin_logs::protocol::ApiConfig;
/// use std::time::Duration;
///
/// // Default endpoint, no authentication
/// let config = ApiConfig::default();
///
/// // With all options
/// let config = ApiConfig::new("https://api.example.com")
///     .with_token("secret-token")
///     .with_timeout(Duration::from_secs(5))
///     .with_connect_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct ApiConfig {
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
    connect_timeout: Duration,
}

impl ApiConfig {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.resin.io";
    /// Default timeout for buffered requests.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default connection timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a configuration for the given API endpoint.
    ///
    /// A trailing `/` is removed so paths can be appended directly.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let mut endpoint = endpoint.into();
        while endpoint.ends_with('/') {
            endpoint.pop();
        }
        Self {
            endpoint,
            token: None,
            timeout: Self::DEFAULT_TIMEOUT,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the bearer token sent with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the timeout for buffered requests.
    ///
    /// Streaming requests ignore it: a log stream stays open until closed.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the connection timeout, applied to every request.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the token if set.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the buffered request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Creates an `HttpClient` from this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not an `http(s)` URL or the HTTP
    /// client cannot be created.
    pub fn into_client(self) -> Result<HttpClient, ProtocolError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ProtocolError::InvalidAddress(format!(
                "endpoint must start with http:// or https://: {}",
                self.endpoint
            )));
        }

        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(ProtocolError::Http)?;

        Ok(HttpClient {
            endpoint: self.endpoint,
            token: self.token,
            timeout: self.timeout,
            client,
        })
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ENDPOINT)
    }
}

// ============================================================================
// HttpClient - Transport implementation
// ============================================================================

/// `reqwest` implementation of [`Transport`].
///
/// # Examples
///
/// ```no_run
/// use resin_logs::protocol::{ApiConfig, ApiRequest, Transport};
///
/// # async fn example() -> resin_logs::Result<()> {
/// let client = ApiConfig::default().with_token("token").into_client()?;
/// let response = client.request(&ApiRequest::get("/device/v2/abc/logs")).await?;
/// println!("HTTP {}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
    client: Client,
}

impl HttpClient {
    /// Returns the API endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the absolute URL for a request.
    fn build_url(&self, request: &ApiRequest) -> String {
        format!("{}{}", self.endpoint, request.path_and_query())
    }
}

impl Transport for HttpClient {
    async fn request(&self, request: &ApiRequest) -> Result<ApiResponse, ProtocolError> {
        let url = self.build_url(request);

        tracing::debug!(url = %url, streaming = request.is_streaming(), "Sending API request");

        let mut builder = self.client.get(&url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if !request.is_streaming() {
            builder = builder.timeout(self.timeout);
        }

        let response = builder.send().await.map_err(ProtocolError::Http)?;
        let status = response.status().as_u16();

        tracing::debug!(url = %url, status, "Received API response headers");

        if request.is_streaming() {
            let stream = response.bytes_stream().map_err(ProtocolError::Http);
            Ok(ApiResponse::streaming(status, stream))
        } else {
            let body = response.bytes().await.map_err(ProtocolError::Http)?;
            Ok(ApiResponse::buffered(status, body))
        }
    }
}
