//! Fetch pipeline and download orchestration.
//!
//! - [`Transport`] sends one request; [`HttpTransport`] is the reqwest implementation
//! - [`RetryPolicy`] decides whether a failed attempt is retried and after how long
//! - [`ResourceFetcher`] composes the two into a bounded-retry fetch
//! - [`TileCountLimit`] caps stored tiles across regions
//! - [`DownloadOrchestrator`] drives a region's activation

pub mod constants;
mod error;
mod fetcher;
mod orchestrator;
mod retry;
mod tile_limit;
mod transport;

pub use error::{FetchError, TransportError};
pub use fetcher::{FetchStats, Fetched, ResourceFetcher};
pub use orchestrator::DownloadOrchestrator;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, MAX_RETRY_ATTEMPTS, RetryDecision, RetryPolicy,
    classify_http_status, classify_transport_error,
};
pub use tile_limit::TileCountLimit;
pub use transport::{HttpTransport, Transport, TransportResponse, default_user_agent};

pub(crate) use orchestrator::Activation;
