//! Region persistence.
//!
//! A [`RegionStore`] owns every byte of an offline region: the definition,
//! the caller's metadata, the fetched resources, and the durable progress
//! counters. Two implementations ship:
//!
//! - [`SqliteRegionStore`] on top of [`Database`](crate::Database)
//! - [`MemoryRegionStore`] for tests and throwaway sessions
//!
//! `put_resource` is the only write that moves progress: it stores the blob
//! and bumps the completed count and bytes in one atomic step, and does
//! nothing for a key that is already stored.

mod error;
mod memory;
mod sqlite;

use std::fmt;

use async_trait::async_trait;

use crate::region::{DownloadState, RegionDefinition, RegionMetadata, RegionStatus, ResourceKey};

pub use error::StoreError;
pub use memory::MemoryRegionStore;
pub use sqlite::SqliteRegionStore;

/// Store-assigned region identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub i64);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A region as read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRegion {
    pub id: RegionId,
    pub definition: RegionDefinition,
    pub metadata: RegionMetadata,
}

/// Persistence contract for offline regions.
#[async_trait]
pub trait RegionStore: Send + Sync + fmt::Debug {
    /// Persists a new region and returns its id. Initial status is inactive
    /// with zero counters.
    async fn allocate_region(
        &self,
        definition: &RegionDefinition,
        metadata: &RegionMetadata,
    ) -> Result<RegionId, StoreError>;

    /// Stores one resource and counts it as completed.
    ///
    /// Returns `false` (and changes nothing) when the key is already stored.
    async fn put_resource(
        &self,
        id: RegionId,
        key: &ResourceKey,
        data: &[u8],
    ) -> Result<bool, StoreError>;

    async fn has_resource(&self, id: RegionId, key: &ResourceKey) -> Result<bool, StoreError>;

    async fn get_resource(
        &self,
        id: RegionId,
        key: &ResourceKey,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Durable status: persisted state and counters.
    async fn get_status(&self, id: RegionId) -> Result<RegionStatus, StoreError>;

    async fn set_download_state(&self, id: RegionId, state: DownloadState)
    -> Result<(), StoreError>;

    async fn set_required_count(
        &self,
        id: RegionId,
        count: u64,
        precise: bool,
    ) -> Result<(), StoreError>;

    async fn update_metadata(
        &self,
        id: RegionId,
        metadata: &RegionMetadata,
    ) -> Result<(), StoreError>;

    /// Every region, ordered by id.
    async fn list_regions(&self) -> Result<Vec<StoredRegion>, StoreError>;

    /// Removes a region and its resources.
    ///
    /// Fails with [`StoreError::RegionActive`] while the persisted state is active.
    /// Returns the number of tiles removed.
    async fn delete_region(&self, id: RegionId) -> Result<u64, StoreError>;

    /// Tiles stored across all regions.
    async fn tile_count(&self) -> Result<u64, StoreError>;
}
