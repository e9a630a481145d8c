//! Offline Regions Library
//!
//! Downloads everything a map needs to render a region without network
//! access: the style, its sprites and glyphs, and every tile covering a
//! bounding box over a zoom range. Downloads can be paused, resumed and
//! cancelled; progress survives restarts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`region`] - Region definitions, handles, status and observers
//! - [`download`] - Transport, retrying fetcher and download orchestration
//! - [`store`] - Region persistence (in-memory and SQLite)
//! - [`db`] - SQLite connection and schema management
//! - [`manager`] - Creating, listing and opening regions
//! - [`config`] - Download tunables
//! - [`connectivity`] - Network reachability with a manual override

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod connectivity;
pub mod db;
pub mod download;
pub mod manager;
pub mod region;
pub mod store;
#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, OfflineConfig, PausePolicy};
pub use connectivity::{AlwaysOnline, Connectivity, ConnectivityError, ConnectivityProbe};
pub use db::{Database, DbError};
pub use download::{
    DownloadOrchestrator, FetchError, FetchStats, Fetched, HttpTransport, ResourceFetcher,
    RetryPolicy, TileCountLimit, Transport, TransportError, TransportResponse,
};
pub use manager::OfflineManager;
pub use region::{
    ChannelObserver, DefinitionError, DownloadState, LatLngBounds, MetadataError, OfflineRegion,
    RegionDefinition, RegionError, RegionErrorKind, RegionEvent, RegionMetadata, RegionObserver,
    RegionStatus, ResourceKey, ResourceKind, StyleResources, TileCoord, TileRange,
};
pub use store::{
    MemoryRegionStore, RegionId, RegionStore, SqliteRegionStore, StoreError, StoredRegion,
};
