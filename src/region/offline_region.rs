//! Handle to one offline region and its download lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{Mutex, watch};
use tracing::{info, instrument};

use super::error::RegionError;
use super::observer::{ObserverSlot, RegionObserver};
use super::status::{DownloadState, RegionStatus};
use super::{RegionDefinition, RegionMetadata};
use crate::download::{Activation, DownloadOrchestrator};
use crate::store::RegionId;

/// State shared by every handle to the same region.
#[derive(Debug)]
pub(crate) struct RegionShared {
    pub(crate) id: RegionId,
    pub(crate) definition: RegionDefinition,
    metadata: RwLock<RegionMetadata>,
    pub(crate) observer: ObserverSlot,
    deliver_inactive: AtomicBool,
    status: watch::Sender<RegionStatus>,
    pub(crate) activation: Mutex<Option<Activation>>,
    pub(crate) generation: AtomicU64,
    drivers: watch::Sender<usize>,
}

impl RegionShared {
    pub(crate) fn new(
        id: RegionId,
        definition: RegionDefinition,
        metadata: RegionMetadata,
        status: RegionStatus,
    ) -> Self {
        Self {
            id,
            definition,
            metadata: RwLock::new(metadata),
            observer: ObserverSlot::default(),
            deliver_inactive: AtomicBool::new(true),
            status: watch::channel(status).0,
            activation: Mutex::new(None),
            generation: AtomicU64::new(0),
            drivers: watch::channel(0).0,
        }
    }

    pub(crate) fn deliver_inactive_messages(&self) -> bool {
        self.deliver_inactive.load(Ordering::SeqCst)
    }

    pub(crate) fn set_state(&self, state: DownloadState) {
        self.status.send_modify(|status| status.download_state = state);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Mirrors an activation's counters into the handle.
    ///
    /// Only the current activation may publish, and it may only ever move
    /// the state to inactive; activation is the caller's decision.
    pub(crate) fn publish_status(&self, generation: u64, update: &RegionStatus) {
        if !self.is_current(generation) {
            return;
        }
        self.status.send_modify(|status| {
            status.required_resource_count = update.required_resource_count;
            status.completed_resource_count = update.completed_resource_count;
            status.completed_resource_bytes = update.completed_resource_bytes;
            status.is_required_count_precise = update.is_required_count_precise;
            if update.download_state == DownloadState::Inactive {
                status.download_state = DownloadState::Inactive;
            }
        });
    }

    pub(crate) fn driver_started(&self) {
        self.drivers.send_modify(|running| *running += 1);
    }

    pub(crate) async fn finish_activation(&self, generation: u64) {
        let mut slot = self.activation.lock().await;
        if slot
            .as_ref()
            .is_some_and(|activation| activation.generation == generation)
        {
            *slot = None;
            self.set_state(DownloadState::Inactive);
        }
        drop(slot);
        self.drivers
            .send_modify(|running| *running = running.saturating_sub(1));
    }
}

/// Handle to an offline region.
///
/// Handles are cheap to clone, and every handle for the same region id
/// obtained from one [`OfflineManager`](crate::OfflineManager) shares state:
/// activating through one handle is visible through all of them.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use offline_regions::{ChannelObserver, DownloadState, OfflineRegion};
///
/// # async fn example(region: OfflineRegion) {
/// let (observer, mut events) = ChannelObserver::channel();
/// region.set_observer(Some(Arc::new(observer)));
/// region.set_download_state(DownloadState::Active).await;
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OfflineRegion {
    shared: Arc<RegionShared>,
    orchestrator: Arc<DownloadOrchestrator>,
}

impl OfflineRegion {
    pub(crate) fn from_shared(
        shared: Arc<RegionShared>,
        orchestrator: Arc<DownloadOrchestrator>,
    ) -> Self {
        Self {
            shared,
            orchestrator,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<RegionShared> {
        &self.shared
    }

    #[must_use]
    pub fn id(&self) -> RegionId {
        self.shared.id
    }

    #[must_use]
    pub fn definition(&self) -> &RegionDefinition {
        &self.shared.definition
    }

    #[must_use]
    pub fn metadata(&self) -> RegionMetadata {
        self.shared
            .metadata
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest in-memory status snapshot.
    #[must_use]
    pub fn status(&self) -> RegionStatus {
        *self.shared.status.borrow()
    }

    #[must_use]
    pub fn download_state(&self) -> DownloadState {
        self.shared.status.borrow().download_state
    }

    /// Replaces the observer; `None` detaches it.
    pub fn set_observer(&self, observer: Option<Arc<dyn RegionObserver>>) {
        self.shared.observer.set(observer);
    }

    /// Whether a paused activation delivers its final inactive snapshot.
    pub fn set_deliver_inactive_messages(&self, deliver: bool) {
        self.shared.deliver_inactive.store(deliver, Ordering::SeqCst);
    }

    #[must_use]
    pub fn deliver_inactive_messages(&self) -> bool {
        self.shared.deliver_inactive_messages()
    }

    /// Starts or pauses the download.
    ///
    /// `Active` on an active region does nothing. `Inactive` behaves as a
    /// cancel: nothing new is fetched and stored resources are kept, so a
    /// later activation resumes where this one stopped.
    #[instrument(skip(self), fields(region_id = %self.id()))]
    pub async fn set_download_state(&self, state: DownloadState) {
        match state {
            DownloadState::Active => self.orchestrator.start_shared(&self.shared).await,
            DownloadState::Inactive => self.orchestrator.pause_shared(&self.shared).await,
        }
    }

    /// Persists new metadata for the region.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Store`] if the store rejects the update.
    #[instrument(skip(self, metadata), fields(region_id = %self.id()))]
    pub async fn update_metadata(&self, metadata: RegionMetadata) -> Result<(), RegionError> {
        self.orchestrator
            .store()
            .update_metadata(self.id(), &metadata)
            .await?;
        *self
            .shared
            .metadata
            .write()
            .unwrap_or_else(PoisonError::into_inner) = metadata;
        Ok(())
    }

    /// Resolves once the region's state is inactive.
    pub async fn wait_for_inactive(&self) {
        let mut rx = self.shared.status.subscribe();
        let _ = rx
            .wait_for(|status| status.download_state == DownloadState::Inactive)
            .await;
    }

    /// Resolves once no download task is running for this region, including
    /// one still draining after a pause.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.shared.drivers.subscribe();
        let _ = rx.wait_for(|running| *running == 0).await;
    }

    /// Deletes the region and every resource stored for it.
    ///
    /// # Errors
    ///
    /// - [`RegionError::RegionBusy`] while active, unless `force` is set; a
    ///   forced delete cancels the download and waits for it to drain first
    /// - [`RegionError::Store`] if the store fails
    #[instrument(skip(self), fields(region_id = %self.id()))]
    pub async fn delete(&self, force: bool) -> Result<(), RegionError> {
        if self.download_state() == DownloadState::Active {
            if !force {
                return Err(RegionError::RegionBusy { id: self.id() });
            }
            self.orchestrator.pause_shared(&self.shared).await;
        }
        self.wait_until_idle().await;

        let tiles = self.orchestrator.store().delete_region(self.id()).await?;
        self.orchestrator.tile_limit().release_many(tiles);
        self.set_observer(None);
        info!(tiles, "region deleted");
        Ok(())
    }
}
