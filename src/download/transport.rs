//! One-shot HTTP transport for offline resources.
//!
//! A [`Transport`] performs exactly one request and reports either the
//! response (any status) or a [`TransportError`]. Retrying is the
//! [`ResourceFetcher`](super::ResourceFetcher)'s job.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::constants::CONNECT_TIMEOUT_SECS;
use super::error::TransportError;

/// Maximum idle connections kept per host.
const MAX_IDLE_PER_HOST: usize = 20;

/// Response from a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Full response body.
    pub body: Vec<u8>,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a single GET request for a resource URL.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Performs one request bounded by `timeout`. Never retries.
    async fn send(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError>;
}

/// User-Agent sent with every request.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("offline-regions/{version}")
}

/// [`Transport`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the default connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the client cannot be built
    /// (for example, no TLS backend could be initialised).
    pub fn new() -> Result<Self, TransportError> {
        Self::with_connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
    }

    /// Creates a transport with an explicit connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Other`] if the client cannot be built.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(MAX_IDLE_PER_HOST)
            .gzip(true)
            .user_agent(default_user_agent())
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    async fn send(&self, url: &str, timeout: Duration) -> Result<TransportResponse, TransportError> {
        let parsed =
            url::Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;

        let response = self
            .client
            .get(parsed)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| map_reqwest_error(&e))?;
        debug!(status, bytes = body.len(), "response received");

        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn map_reqwest_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        return TransportError::Timeout;
    }
    if error.is_builder() {
        return TransportError::InvalidUrl(error.to_string());
    }
    let message = error_chain(error);
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("certificate") || lowered.contains("tls") || lowered.contains("ssl") {
        return TransportError::Tls(message);
    }
    if error.is_connect() {
        return TransportError::Connection(message);
    }
    TransportError::Other(message)
}

// reqwest's Display hides the cause, which is where TLS details live.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
