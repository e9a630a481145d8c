//! Entry point for creating and finding offline regions.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use crate::config::OfflineConfig;
use crate::connectivity::Connectivity;
use crate::download::{DownloadOrchestrator, ResourceFetcher, TileCountLimit};
use crate::region::{
    DownloadState, OfflineRegion, RegionDefinition, RegionError, RegionMetadata, RegionShared,
    RegionStatus,
};
use crate::store::{RegionId, RegionStore, StoreError, StoredRegion};

/// Owns the store, the fetch pipeline and the registry of live region handles.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use offline_regions::{
///     HttpTransport, LatLngBounds, MemoryRegionStore, OfflineConfig, OfflineManager,
///     RegionDefinition, RegionMetadata, ResourceFetcher, RetryPolicy, connectivity,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = ResourceFetcher::new(Arc::new(HttpTransport::new()?), RetryPolicy::default());
/// let manager = OfflineManager::open(
///     Arc::new(MemoryRegionStore::new()),
///     fetcher,
///     OfflineConfig::default(),
///     connectivity::global(),
/// )
/// .await?;
///
/// let definition = RegionDefinition::new(
///     "https://maps.example.com/style.json",
///     "https://tiles.example.com/{z}/{x}/{y}.pbf",
///     LatLngBounds::new(40.70, -74.02, 40.80, -73.93),
///     10.0,
///     14.0,
///     2.0,
/// )?;
/// let region = manager
///     .create_region(definition, RegionMetadata::from_region_name("Manhattan")?)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct OfflineManager {
    orchestrator: Arc<DownloadOrchestrator>,
    regions: DashMap<RegionId, Weak<RegionShared>>,
}

impl OfflineManager {
    /// Opens a manager using the process-wide [`TileCountLimit`].
    ///
    /// The configured attempt bound replaces the fetcher's, keeping its backoff.
    ///
    /// # Errors
    ///
    /// - [`RegionError::Config`] if `config` fails validation
    /// - [`RegionError::Store`] if the store cannot be read
    pub async fn open(
        store: Arc<dyn RegionStore>,
        fetcher: ResourceFetcher,
        config: OfflineConfig,
        connectivity: Arc<Connectivity>,
    ) -> Result<Self, RegionError> {
        Self::open_with_tile_limit(store, fetcher, config, connectivity, TileCountLimit::global())
            .await
    }

    /// Opens a manager with its own tile limit instead of the process-wide one.
    ///
    /// # Errors
    ///
    /// Same as [`OfflineManager::open`].
    #[instrument(skip_all)]
    pub async fn open_with_tile_limit(
        store: Arc<dyn RegionStore>,
        fetcher: ResourceFetcher,
        config: OfflineConfig,
        connectivity: Arc<Connectivity>,
        tile_limit: Arc<TileCountLimit>,
    ) -> Result<Self, RegionError> {
        config.validate()?;

        // Regions left active by a previous process have no driver any more.
        for region in store.list_regions().await? {
            let status = store.get_status(region.id).await?;
            if status.download_state == DownloadState::Active {
                warn!(region_id = %region.id, "resetting region left active");
                store
                    .set_download_state(region.id, DownloadState::Inactive)
                    .await?;
            }
        }

        let stored_tiles = store.tile_count().await?;
        tile_limit.set_count(stored_tiles);
        if config.tile_count_limit.is_some() {
            tile_limit.set_limit(config.tile_count_limit);
        }
        info!(
            stored_tiles,
            tile_count_limit = ?tile_limit.limit(),
            "offline manager opened"
        );

        let fetcher = fetcher.with_policy(
            fetcher
                .policy()
                .clone()
                .with_attempts(config.max_retry_attempts),
        );
        let orchestrator =
            DownloadOrchestrator::new(store, fetcher, config, connectivity, tile_limit);

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            regions: DashMap::new(),
        })
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Arc<DownloadOrchestrator> {
        &self.orchestrator
    }

    #[must_use]
    pub fn connectivity(&self) -> &Arc<Connectivity> {
        self.orchestrator.connectivity()
    }

    /// Persists a new region and returns an inactive handle to it.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Store`] if the region cannot be persisted.
    #[instrument(skip_all)]
    pub async fn create_region(
        &self,
        definition: RegionDefinition,
        metadata: RegionMetadata,
    ) -> Result<OfflineRegion, RegionError> {
        let id = self
            .orchestrator
            .store()
            .allocate_region(&definition, &metadata)
            .await?;
        info!(region_id = %id, "region created");
        Ok(self.handle(
            StoredRegion {
                id,
                definition,
                metadata,
            },
            RegionStatus::default(),
        ))
    }

    /// Every stored region, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Store`] if the store cannot be read.
    pub async fn list_regions(&self) -> Result<Vec<OfflineRegion>, RegionError> {
        let store = self.orchestrator.store();
        let mut regions = Vec::new();
        for stored in store.list_regions().await? {
            let status = store.get_status(stored.id).await?;
            regions.push(self.handle(stored, status));
        }
        Ok(regions)
    }

    /// Handle for one stored region.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Store`] with [`StoreError::RegionNotFound`] if
    /// no such region exists.
    pub async fn region(&self, id: RegionId) -> Result<OfflineRegion, RegionError> {
        // A live handle may outlive its deleted region, so the store decides.
        let store = self.orchestrator.store();
        let stored = store
            .list_regions()
            .await?
            .into_iter()
            .find(|region| region.id == id)
            .ok_or(StoreError::RegionNotFound { id })?;
        if let Some(shared) = self.live(id) {
            return Ok(OfflineRegion::from_shared(
                shared,
                Arc::clone(&self.orchestrator),
            ));
        }
        let status = store.get_status(id).await?;
        Ok(self.handle(stored, status))
    }

    /// Sets the ceiling on stored tiles across all regions; `None` removes it.
    pub fn set_tile_count_limit(&self, limit: Option<u64>) {
        self.orchestrator.tile_limit().set_limit(limit);
    }

    #[must_use]
    pub fn tile_count_limit(&self) -> Option<u64> {
        self.orchestrator.tile_limit().limit()
    }

    fn live(&self, id: RegionId) -> Option<Arc<RegionShared>> {
        self.regions.get(&id).and_then(|weak| weak.upgrade())
    }

    /// Returns the live handle for `stored.id`, or registers a new one.
    fn handle(&self, stored: StoredRegion, status: RegionStatus) -> OfflineRegion {
        let mut entry = self.regions.entry(stored.id).or_default();
        let shared = if let Some(shared) = entry.upgrade() {
            shared
        } else {
            debug!(region_id = %stored.id, "registering region handle");
            let shared = Arc::new(RegionShared::new(
                stored.id,
                stored.definition,
                stored.metadata,
                status,
            ));
            *entry = Arc::downgrade(&shared);
            shared
        };
        drop(entry);
        self.regions.retain(|_, weak| weak.strong_count() > 0);
        OfflineRegion::from_shared(shared, Arc::clone(&self.orchestrator))
    }
}
