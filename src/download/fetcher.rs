//! Retrying resource fetcher.
//!
//! Composes a [`Transport`] with a [`RetryPolicy`]: every attempt is a single
//! `send`, and the policy decides whether another one follows.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::error::{FetchError, TransportError};
use super::retry::{
    FailureType, RetryDecision, RetryPolicy, classify_http_status, classify_transport_error,
};
use super::transport::Transport;

/// Body of a successfully fetched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Response body.
    pub bytes: Vec<u8>,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Cumulative counters across every fetch made by one fetcher.
#[derive(Debug, Default)]
pub struct FetchStats {
    requests: AtomicUsize,
    retries: AtomicUsize,
    failures: AtomicUsize,
}

impl FetchStats {
    /// Requests sent, counting each retry.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Retries scheduled after a failed attempt.
    #[must_use]
    pub fn retries(&self) -> usize {
        self.retries.load(Ordering::SeqCst)
    }

    /// Fetches that ended in a [`FetchError`].
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Fetches one resource URL with bounded retry.
///
/// Cheap to clone; clones share the transport and the stats.
#[derive(Clone)]
pub struct ResourceFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    stats: Arc<FetchStats>,
}

impl fmt::Debug for ResourceFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceFetcher")
            .field("transport", &self.transport)
            .field("max_attempts", &self.policy.max_attempts())
            .finish_non_exhaustive()
    }
}

struct AttemptFailure {
    failure_type: FailureType,
    status: Option<u16>,
    reason: String,
}

impl AttemptFailure {
    fn from_transport(error: &TransportError) -> Self {
        Self {
            failure_type: classify_transport_error(error),
            status: None,
            reason: error.to_string(),
        }
    }

    fn from_status(status: u16) -> Self {
        Self {
            failure_type: classify_http_status(status),
            status: Some(status),
            reason: format!("HTTP {status}"),
        }
    }
}

impl ResourceFetcher {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            stats: Arc::new(FetchStats::default()),
        }
    }

    /// Returns a fetcher sharing this one's transport and stats with a different policy.
    #[must_use]
    pub fn with_policy(&self, policy: RetryPolicy) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            policy,
            stats: Arc::clone(&self.stats),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Fetches `url`, retrying transient failures until the policy gives up.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Transient`] when timeouts, connection failures, 408,
    ///   429 or 5xx responses outlast the retry budget
    /// - [`FetchError::Permanent`] immediately on other 4xx responses, TLS
    ///   failures and unusable URLs
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str, timeout: Duration) -> Result<Fetched, FetchError> {
        let mut attempt: u32 = 1;

        loop {
            self.stats.requests.fetch_add(1, Ordering::SeqCst);

            let failure = match self.transport.send(url, timeout).await {
                Ok(response) if response.is_success() => {
                    debug!(attempt, bytes = response.body.len(), "fetched");
                    return Ok(Fetched {
                        bytes: response.body,
                        attempts: attempt,
                    });
                }
                Ok(response) => AttemptFailure::from_status(response.status),
                Err(error) => AttemptFailure::from_transport(&error),
            };

            match self.policy.should_retry(failure.failure_type, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        url,
                        attempt = next_attempt,
                        max_attempts = self.policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %failure.reason,
                        "retrying fetch"
                    );
                    self.stats.retries.fetch_add(1, Ordering::SeqCst);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url, %reason, "not retrying fetch");
                    self.stats.failures.fetch_add(1, Ordering::SeqCst);
                    return Err(if failure.failure_type.is_retryable() {
                        FetchError::transient(url, attempt, failure.reason)
                    } else {
                        FetchError::permanent(url, attempt, failure.status, failure.reason)
                    });
                }
            }
        }
    }
}
