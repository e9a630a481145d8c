//! Error types for the fetch pipeline.
//!
//! [`TransportError`] is what a single request can fail with;
//! [`FetchError`] is what the retrying [`ResourceFetcher`](super::ResourceFetcher)
//! reports after its retry budget is spent.

use thiserror::Error;

use crate::region::RegionErrorKind;

/// Failure of a single transport request (no status code received).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection could not be established or was reset.
    #[error("connection failed: {0}")]
    Connection(String),

    /// TLS or certificate failure.
    #[error("TLS failure: {0}")]
    Tls(String),

    /// URL could not be parsed or used.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Any other transport-level failure (body read, protocol).
    #[error("transport failure: {0}")]
    Other(String),
}

/// Error returned by [`ResourceFetcher::fetch`](super::ResourceFetcher::fetch).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Timeout, connection failure, or retryable status that outlived the retry budget.
    #[error("transient failure fetching {url} after {attempts} attempt(s): {reason}")]
    Transient {
        /// The URL that failed.
        url: String,
        /// Attempts made, including the first.
        attempts: u32,
        /// Last failure seen.
        reason: String,
    },

    /// Failure that retrying will not fix (4xx, TLS, bad URL).
    #[error("permanent failure fetching {url} after {attempts} attempt(s): {reason}")]
    Permanent {
        /// The URL that failed.
        url: String,
        /// Attempts made, including the first.
        attempts: u32,
        /// HTTP status, when the server answered.
        status: Option<u16>,
        /// Failure description.
        reason: String,
    },
}

impl FetchError {
    /// Creates a transient error.
    pub fn transient(url: impl Into<String>, attempts: u32, reason: impl Into<String>) -> Self {
        Self::Transient {
            url: url.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// Creates a permanent error.
    pub fn permanent(
        url: impl Into<String>,
        attempts: u32,
        status: Option<u16>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Permanent {
            url: url.into(),
            attempts,
            status,
            reason: reason.into(),
        }
    }

    /// Attempts made before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Transient { attempts, .. } | Self::Permanent { attempts, .. } => *attempts,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Transient { url, .. } | Self::Permanent { url, .. } => url,
        }
    }

    /// Region error category this failure surfaces as.
    #[must_use]
    pub fn kind(&self) -> RegionErrorKind {
        match self {
            Self::Transient { .. } => RegionErrorKind::FetchTransient,
            Self::Permanent { .. } => RegionErrorKind::FetchPermanent,
        }
    }
}
