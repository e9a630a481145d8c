//! Download configuration.

use std::time::Duration;

use thiserror::Error;

use crate::download::constants::{
    DEFAULT_FETCH_TIMEOUT, DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_OFFLINE_POLL_INTERVAL,
    MAX_CONCURRENCY, MIN_CONCURRENCY,
};
use crate::download::{DEFAULT_MAX_RETRIES, MAX_RETRY_ATTEMPTS, RetryPolicy};

/// Longest accepted per-fetch timeout.
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(3600);

/// What pausing does to fetches that are already in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PausePolicy {
    /// Let in-flight fetches finish and discard their results.
    #[default]
    Drain,
    /// Abort in-flight fetch tasks immediately.
    Abort,
}

/// Invalid [`OfflineConfig`] values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },

    #[error("invalid retry attempts {value}: must be between 1 and {MAX_RETRY_ATTEMPTS}")]
    InvalidRetryAttempts { value: u32 },

    #[error("invalid fetch timeout {value:?}: must be between 1s and 1h")]
    InvalidFetchTimeout { value: Duration },

    #[error("offline poll interval must be non-zero")]
    InvalidPollInterval,
}

/// Tunables for region downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineConfig {
    /// Simultaneous fetches per active region.
    pub max_concurrent_fetches: usize,
    /// Timeout for one fetch attempt.
    pub fetch_timeout: Duration,
    /// Attempts per resource, including the first.
    pub max_retry_attempts: u32,
    /// Ceiling on stored tiles across all regions; `None` is unlimited.
    pub tile_count_limit: Option<u64>,
    /// How often a download blocked on connectivity re-checks it.
    pub offline_poll_interval: Duration,
    pub pause_policy: PausePolicy,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_retry_attempts: DEFAULT_MAX_RETRIES,
            tile_count_limit: None,
            offline_poll_interval: DEFAULT_OFFLINE_POLL_INTERVAL,
            pause_policy: PausePolicy::Drain,
        }
    }
}

impl OfflineConfig {
    /// Checks every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.max_concurrent_fetches) {
            return Err(ConfigError::InvalidConcurrency {
                value: self.max_concurrent_fetches,
            });
        }
        if !(1..=MAX_RETRY_ATTEMPTS).contains(&self.max_retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts {
                value: self.max_retry_attempts,
            });
        }
        if self.fetch_timeout < Duration::from_secs(1) || self.fetch_timeout > MAX_FETCH_TIMEOUT {
            return Err(ConfigError::InvalidFetchTimeout {
                value: self.fetch_timeout,
            });
        }
        if self.offline_poll_interval.is_zero() {
            return Err(ConfigError::InvalidPollInterval);
        }
        Ok(())
    }

    /// Default backoff with this config's attempt bound.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_retry_attempts)
    }
}
