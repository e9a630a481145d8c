//! Backoff and retry classification for resource fetches.
//!
//! A failed attempt is mapped to a [`FailureType`] by
//! [`classify_transport_error`] or [`classify_http_status`]. The fetcher then
//! asks [`RetryPolicy::should_retry`] whether another attempt fits in the
//! budget and how long to sleep first.
//!
//! ```
//! use offline_regions::download::{
//!     RetryPolicy, RetryDecision, TransportError, classify_transport_error,
//! };
//!
//! let policy = RetryPolicy::default();
//! let failure = classify_transport_error(&TransportError::Timeout);
//! assert!(matches!(
//!     policy.should_retry(failure, 1),
//!     RetryDecision::Retry { attempt: 2, .. }
//! ));
//! assert!(matches!(
//!     policy.should_retry(failure, policy.max_attempts()),
//!     RetryDecision::DoNotRetry { .. }
//! ));
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::TransportError;

/// Default maximum attempts, including the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound accepted for configured attempts.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(250);

/// How a failed fetch attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Timeouts, dropped connections, 408 and 5xx.
    Transient,
    /// Other 4xx, TLS and URL errors. Never retried.
    Permanent,
    /// 429 from the tile or style server.
    RateLimited,
}

impl FailureType {
    /// Whether the failure, once retries run out, counts as transient.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Outcome of [`RetryPolicy::should_retry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then make attempt number `attempt`.
    Retry { delay: Duration, attempt: u32 },
    /// Give up; `reason` ends up in the fetch error's log line.
    DoNotRetry { reason: String },
}

/// Attempt budget and backoff curve for one resource.
///
/// The sleep before attempt `n + 1` is
/// `min(base_delay * backoff_multiplier^(n - 1), max_delay)` plus up to
/// `max_jitter` of random slack. The default allows 3 attempts starting at
/// 500 ms, doubling, capped at 30 s, with 250 ms of jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Counts the first attempt; never below 1.
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Custom backoff curve with the default jitter. `max_attempts` is raised to 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            max_jitter: DEFAULT_MAX_JITTER,
        }
    }

    /// Default backoff curve with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy that retries without waiting. Intended for tests and local mirrors.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            max_jitter: Duration::ZERO,
        }
    }

    /// Same backoff, different attempt bound.
    #[must_use]
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Replaces the jitter bound.
    #[must_use]
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what follows the failure of attempt number `attempt` (counting from 1).
    #[instrument(level = "trace", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, "attempt budget spent");
            return RetryDecision::DoNotRetry {
                reason: format!("gave up after {attempt} attempts"),
            };
        }

        let delay = self.delay_after(attempt);
        debug!(attempt, delay_ms = delay.as_millis(), "backing off before retry");
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Sleep that follows failed attempt `attempt`.
    fn delay_after(&self, attempt: u32) -> Duration {
        let steps = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = f64::from(self.backoff_multiplier).powi(steps);
        // Overflow, NaN and negative factors all land on the cap.
        let backoff = Duration::try_from_secs_f64(self.base_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay));
        backoff + self.jitter()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Classifies a transport failure for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Timeout | Transient |
/// | Connection | Transient |
/// | Other | Transient |
/// | Tls | Permanent |
/// | InvalidUrl | Permanent |
#[must_use]
pub fn classify_transport_error(error: &TransportError) -> FailureType {
    match error {
        TransportError::Timeout | TransportError::Connection(_) | TransportError::Other(_) => {
            FailureType::Transient
        }
        TransportError::Tls(_) | TransportError::InvalidUrl(_) => FailureType::Permanent,
    }
}

/// Classifies a non-success HTTP status code.
#[allow(clippy::match_same_arms)]
#[must_use]
pub fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,   // Request Timeout
        429 => FailureType::RateLimited, // Too Many Requests

        // Other 4xx are permanent
        status if (400..500).contains(&status) => FailureType::Permanent,

        // 5xx are transient
        status if (500..600).contains(&status) => FailureType::Transient,

        // Anything else is unexpected, treat as permanent
        _ => FailureType::Permanent,
    }
}
