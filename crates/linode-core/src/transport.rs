//! Transport capability.
//!
//! The node client never talks to the network directly: it hands a fully
//! encoded [`ApiRequest`] to a [`Transport`] and interprets the [`RawResponse`]
//! itself. [`HttpTransport`] is the reqwest-backed implementation used by
//! default; tests and callers with special networking needs supply their own.

use crate::client::ClientConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use tracing::debug;
use url::Url;

/// A fully encoded request, ready to be sent.
///
/// The URL carries every API argument, including the key, so it must never be
/// logged verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including the query string
    pub url: Url,
}

/// Status and body of a completed round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Numeric HTTP status
    pub status: u16,
    /// Reason phrase for the status, possibly empty.
    ///
    /// reqwest does not expose the phrase the server sent, so [`HttpTransport`]
    /// fills in the canonical phrase for the status code. A server that sends
    /// a custom phrase (`500 Database Down`) is reported as
    /// `500 Internal Server Error`.
    pub reason: String,
    /// Response body as text
    pub body: String,
}

impl RawResponse {
    /// Build a response, filling in the canonical reason phrase for `status`.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string();

        Self {
            status,
            reason,
            body: body.into(),
        }
    }

    /// The status line, e.g. `500 Internal Server Error`.
    #[must_use]
    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.reason)
        }
    }
}

/// "Send a request, get a response" capability.
///
/// Implementations own connection handling, TLS and timeouts. They report
/// every completed round trip as `Ok`, whatever its status; only failures to
/// obtain a response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if no response could be obtained.
    async fn send(&self, request: ApiRequest) -> Result<RawResponse>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    enable_logging: bool,
}

impl HttpTransport {
    /// Build a transport from the HTTP settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig, user_agent: &str) -> Result<Self> {
        let mut builder = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(user_agent)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if !config.enable_compression {
            builder = builder.no_gzip();
        }

        let http = builder
            .build()
            .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            enable_logging: config.enable_logging,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<RawResponse> {
        let ApiRequest { method, url } = request;

        if self.enable_logging {
            debug!(
                %method,
                host = url.host_str().unwrap_or_default(),
                path = url.path(),
                "sending Linode API request"
            );
        }

        let response = self
            .http
            .request(method, url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if self.enable_logging {
            debug!(status = status.as_u16(), bytes = body.len(), "Linode API responded");
        }

        Ok(RawResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}
