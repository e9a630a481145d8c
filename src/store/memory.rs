//! In-memory [`RegionStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use super::{RegionId, RegionStore, StoreError, StoredRegion};
use crate::region::{DownloadState, RegionDefinition, RegionMetadata, RegionStatus, ResourceKey, ResourceKind};

#[derive(Debug)]
struct MemoryRegion {
    definition: RegionDefinition,
    metadata: RegionMetadata,
    status: RegionStatus,
    resources: HashMap<String, (ResourceKind, Vec<u8>)>,
}

/// Region store kept entirely in process memory.
///
/// Each region is one map entry; counter updates happen under that entry's lock.
#[derive(Debug)]
pub struct MemoryRegionStore {
    regions: DashMap<RegionId, MemoryRegion>,
    next_id: AtomicI64,
}

impl Default for MemoryRegionStore {
    fn default() -> Self {
        Self {
            regions: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryRegionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegionStore for MemoryRegionStore {
    #[instrument(level = "debug", skip_all)]
    async fn allocate_region(
        &self,
        definition: &RegionDefinition,
        metadata: &RegionMetadata,
    ) -> Result<RegionId, StoreError> {
        let id = RegionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.regions.insert(
            id,
            MemoryRegion {
                definition: definition.clone(),
                metadata: metadata.clone(),
                status: RegionStatus::default(),
                resources: HashMap::new(),
            },
        );
        debug!(%id, "region allocated");
        Ok(id)
    }

    async fn put_resource(
        &self,
        id: RegionId,
        key: &ResourceKey,
        data: &[u8],
    ) -> Result<bool, StoreError> {
        let mut region = self
            .regions
            .get_mut(&id)
            .ok_or(StoreError::RegionNotFound { id })?;
        if region.resources.contains_key(key.url()) {
            return Ok(false);
        }
        region
            .resources
            .insert(key.url().to_string(), (key.kind(), data.to_vec()));
        region.status.completed_resource_count += 1;
        region.status.completed_resource_bytes += data.len() as u64;
        Ok(true)
    }

    async fn has_resource(&self, id: RegionId, key: &ResourceKey) -> Result<bool, StoreError> {
        let region = self
            .regions
            .get(&id)
            .ok_or(StoreError::RegionNotFound { id })?;
        Ok(region.resources.contains_key(key.url()))
    }

    async fn get_resource(
        &self,
        id: RegionId,
        key: &ResourceKey,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let region = self
            .regions
            .get(&id)
            .ok_or(StoreError::RegionNotFound { id })?;
        Ok(region.resources.get(key.url()).map(|(_, data)| data.clone()))
    }

    async fn get_status(&self, id: RegionId) -> Result<RegionStatus, StoreError> {
        self.regions
            .get(&id)
            .map(|region| region.status)
            .ok_or(StoreError::RegionNotFound { id })
    }

    async fn set_download_state(
        &self,
        id: RegionId,
        state: DownloadState,
    ) -> Result<(), StoreError> {
        let mut region = self
            .regions
            .get_mut(&id)
            .ok_or(StoreError::RegionNotFound { id })?;
        region.status.download_state = state;
        Ok(())
    }

    async fn set_required_count(
        &self,
        id: RegionId,
        count: u64,
        precise: bool,
    ) -> Result<(), StoreError> {
        let mut region = self
            .regions
            .get_mut(&id)
            .ok_or(StoreError::RegionNotFound { id })?;
        region.status.required_resource_count = count;
        region.status.is_required_count_precise = precise;
        Ok(())
    }

    async fn update_metadata(
        &self,
        id: RegionId,
        metadata: &RegionMetadata,
    ) -> Result<(), StoreError> {
        let mut region = self
            .regions
            .get_mut(&id)
            .ok_or(StoreError::RegionNotFound { id })?;
        region.metadata = metadata.clone();
        Ok(())
    }

    async fn list_regions(&self) -> Result<Vec<StoredRegion>, StoreError> {
        let mut regions: Vec<StoredRegion> = self
            .regions
            .iter()
            .map(|entry| StoredRegion {
                id: *entry.key(),
                definition: entry.definition.clone(),
                metadata: entry.metadata.clone(),
            })
            .collect();
        regions.sort_by_key(|region| region.id);
        Ok(regions)
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_region(&self, id: RegionId) -> Result<u64, StoreError> {
        let removed = self
            .regions
            .remove_if(&id, |_, region| {
                region.status.download_state == DownloadState::Inactive
            });
        match removed {
            Some((_, region)) => Ok(region
                .resources
                .values()
                .filter(|(kind, _)| *kind == ResourceKind::Tile)
                .count() as u64),
            None if self.regions.contains_key(&id) => Err(StoreError::RegionActive { id }),
            None => Err(StoreError::RegionNotFound { id }),
        }
    }

    async fn tile_count(&self) -> Result<u64, StoreError> {
        Ok(self
            .regions
            .iter()
            .map(|region| {
                region
                    .resources
                    .values()
                    .filter(|(kind, _)| *kind == ResourceKind::Tile)
                    .count() as u64
            })
            .sum())
    }
}
