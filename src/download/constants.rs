//! Constants for the fetch pipeline (timeouts, concurrency, polling).

use std::time::Duration;

/// Default per-fetch timeout covering connect, read and write (1 minute).
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Default HTTP connect timeout for the reqwest transport (1 minute).
pub const CONNECT_TIMEOUT_SECS: u64 = 60;

/// Default number of simultaneous fetches per active region.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 20;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// How often a download waiting for connectivity re-checks it.
pub const DEFAULT_OFFLINE_POLL_INTERVAL: Duration = Duration::from_secs(1);
