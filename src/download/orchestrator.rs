//! Region download orchestration.
//!
//! Each activation of a region runs one driver task:
//!
//! 1. mark the region active in the store and read its durable counters
//! 2. load the style (from the store, or fetch and persist it)
//! 3. count the full resource list from the style and persist the precise count
//! 4. walk the resource list lazily, dispatching every resource not yet
//!    stored, bounded by a semaphore
//! 5. drain in-flight fetches, then mark the region inactive
//!
//! All status changes for the activation flow through one status actor
//! (see `progress`), so observers see counts in order and the terminal
//! notification at most once.
//!
//! # Cancellation
//!
//! Pause and cancel set the activation's [`CancelFlag`]. No fetch is
//! dispatched after the flag is seen, and results that arrive after it are
//! neither stored nor counted. With [`PausePolicy::Abort`] in-flight tasks
//! are aborted instead of drained.

mod progress;
mod task;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

use self::progress::{StatusActor, StatusEvent};
use self::task::FetchContext;
use super::{ResourceFetcher, TileCountLimit};
use crate::config::{OfflineConfig, PausePolicy};
use crate::connectivity::Connectivity;
use crate::region::{
    DownloadState, OfflineRegion, RegionDefinition, RegionErrorKind, RegionShared, RegionStatus,
    ResourceKey, StyleResources,
};
use crate::store::{RegionId, RegionStore, StoreError};

/// One-way cancellation signal shared by an activation's tasks.
#[derive(Debug, Clone)]
pub(crate) struct CancelFlag(Arc<watch::Sender<bool>>);

impl CancelFlag {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self(Arc::new(tx))
    }

    /// Sets the flag. Returns `true` only for the caller that set it first.
    pub(crate) fn cancel(&self) -> bool {
        self.0.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the flag is set.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// The running (or draining) activation of a region.
#[derive(Debug)]
pub(crate) struct Activation {
    pub(crate) generation: u64,
    pub(crate) cancel: CancelFlag,
    pub(crate) driver: JoinHandle<()>,
}

struct DriverArgs {
    region: Weak<RegionShared>,
    id: RegionId,
    definition: RegionDefinition,
    generation: u64,
    cancel: CancelFlag,
    previous: Option<JoinHandle<()>>,
}

/// Starts, pauses and drives region downloads.
///
/// Shared by every region handle of one [`OfflineManager`](crate::OfflineManager).
#[derive(Debug)]
pub struct DownloadOrchestrator {
    store: Arc<dyn RegionStore>,
    fetcher: ResourceFetcher,
    config: OfflineConfig,
    connectivity: Arc<Connectivity>,
    tile_limit: Arc<TileCountLimit>,
}

impl DownloadOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn RegionStore>,
        fetcher: ResourceFetcher,
        config: OfflineConfig,
        connectivity: Arc<Connectivity>,
        tile_limit: Arc<TileCountLimit>,
    ) -> Self {
        debug!(
            max_concurrent_fetches = config.max_concurrent_fetches,
            fetch_timeout_ms = config.fetch_timeout.as_millis(),
            max_attempts = fetcher.policy().max_attempts(),
            pause_policy = ?config.pause_policy,
            "creating download orchestrator"
        );
        Self {
            store,
            fetcher,
            config,
            connectivity,
            tile_limit,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RegionStore> {
        &self.store
    }

    #[must_use]
    pub fn fetcher(&self) -> &ResourceFetcher {
        &self.fetcher
    }

    #[must_use]
    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    #[must_use]
    pub fn connectivity(&self) -> &Arc<Connectivity> {
        &self.connectivity
    }

    #[must_use]
    pub fn tile_limit(&self) -> &Arc<TileCountLimit> {
        &self.tile_limit
    }

    /// Activates `region`. Does nothing if it is already downloading.
    ///
    /// A region that was paused but is still draining its previous
    /// activation is restarted once that activation has finished.
    pub async fn start(self: &Arc<Self>, region: &OfflineRegion) {
        self.start_shared(region.shared()).await;
    }

    /// Stops dispatching new fetches for `region` and returns it to inactive.
    pub async fn pause(&self, region: &OfflineRegion) {
        self.pause_shared(region.shared()).await;
    }

    /// Same as [`pause`](Self::pause); stored resources are kept either way.
    pub async fn cancel(&self, region: &OfflineRegion) {
        self.pause_shared(region.shared()).await;
    }

    #[instrument(level = "debug", skip_all, fields(region_id = %region.id))]
    pub(crate) async fn start_shared(self: &Arc<Self>, region: &Arc<RegionShared>) {
        let mut slot = region.activation.lock().await;
        if slot
            .as_ref()
            .is_some_and(|activation| !activation.cancel.is_cancelled())
        {
            debug!("region already active");
            return;
        }

        let previous = slot.take().map(|activation| activation.driver);
        let generation = region.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancelFlag::new();
        region.set_state(DownloadState::Active);
        region.driver_started();
        info!(generation, draining_previous = previous.is_some(), "region activated");

        let driver = tokio::spawn(Arc::clone(self).drive(DriverArgs {
            region: Arc::downgrade(region),
            id: region.id,
            definition: region.definition.clone(),
            generation,
            cancel: cancel.clone(),
            previous,
        }));

        *slot = Some(Activation {
            generation,
            cancel,
            driver,
        });
    }

    #[instrument(level = "debug", skip_all, fields(region_id = %region.id))]
    pub(crate) async fn pause_shared(&self, region: &Arc<RegionShared>) {
        let slot = region.activation.lock().await;
        if let Some(activation) = slot.as_ref()
            && activation.cancel.cancel()
        {
            info!(generation = activation.generation, "region paused");
        }
        drop(slot);
        region.set_state(DownloadState::Inactive);
    }

    async fn drive(self: Arc<Self>, args: DriverArgs) {
        let DriverArgs {
            region,
            id,
            definition,
            generation,
            cancel,
            previous,
        } = args;

        if let Some(previous) = previous
            && let Err(e) = previous.await
        {
            warn!(region_id = %id, error = %e, "previous activation ended abnormally");
        }

        let (events, rx) = mpsc::unbounded_channel();
        let actor = StatusActor::new(
            region.clone(),
            id,
            generation,
            cancel.clone(),
            Arc::clone(&self.store),
        );
        let actor = tokio::spawn(actor.run(rx));

        let ctx = Arc::new(FetchContext {
            id,
            store: Arc::clone(&self.store),
            fetcher: self.fetcher.clone(),
            timeout: self.config.fetch_timeout,
            tile_limit: Arc::clone(&self.tile_limit),
            cancel,
            events: events.clone(),
        });
        self.run_activation(&ctx, &definition).await;
        drop(ctx);

        let _ = events.send(StatusEvent::Drained);
        drop(events);
        if let Err(e) = actor.await {
            warn!(region_id = %id, error = %e, "status actor ended abnormally");
        }

        if let Err(e) = self
            .store
            .set_download_state(id, DownloadState::Inactive)
            .await
        {
            warn!(region_id = %id, error = %e, "failed to persist inactive state");
        }
        if let Some(region) = region.upgrade() {
            region.finish_activation(generation).await;
        }
        info!(region_id = %id, generation, "activation finished");
    }

    async fn run_activation(&self, ctx: &Arc<FetchContext>, definition: &RegionDefinition) {
        let durable = match self.begin(ctx.id, definition).await {
            Ok(status) => status,
            Err(e) => {
                ctx.fail(RegionErrorKind::Store, e.to_string());
                return;
            }
        };
        let _ = ctx.events.send(StatusEvent::Begin(durable));

        let Some(style) = self.load_style(ctx, definition).await else {
            return;
        };
        let resources = match StyleResources::from_style_json(
            definition.style_url(),
            &style,
            definition.pixel_ratio(),
        ) {
            Ok(resources) => resources,
            Err(e) => {
                ctx.fail(
                    RegionErrorKind::FetchPermanent,
                    format!("unparseable style {}: {e}", definition.style_url()),
                );
                return;
            }
        };

        let required = definition.required_resource_count_with(&resources);
        if let Err(e) = self.store.set_required_count(ctx.id, required, true).await {
            ctx.fail(RegionErrorKind::Store, e.to_string());
            return;
        }
        debug!(region_id = %ctx.id, required, "required resource count is precise");
        let _ = ctx.events.send(StatusEvent::Required {
            count: required,
            precise: true,
        });

        // The style is always first and is already stored.
        let keys = definition.required_resources_with(&resources).skip(1);
        self.dispatch(ctx, keys).await;
    }

    async fn begin(
        &self,
        id: RegionId,
        definition: &RegionDefinition,
    ) -> Result<RegionStatus, StoreError> {
        self.store
            .set_download_state(id, DownloadState::Active)
            .await?;
        let mut status = self.store.get_status(id).await?;
        if !status.is_required_count_precise {
            let estimate = definition.required_resource_count();
            self.store.set_required_count(id, estimate, false).await?;
            status.required_resource_count = estimate;
        }
        status.download_state = DownloadState::Active;
        Ok(status)
    }

    async fn load_style(
        &self,
        ctx: &Arc<FetchContext>,
        definition: &RegionDefinition,
    ) -> Option<Vec<u8>> {
        let key = definition.style_key();
        match self.store.get_resource(ctx.id, &key).await {
            Ok(Some(bytes)) => {
                debug!(region_id = %ctx.id, "style already stored");
                return Some(bytes);
            }
            Ok(None) => {}
            Err(e) => {
                ctx.fail(RegionErrorKind::Store, e.to_string());
                return None;
            }
        }
        if !self.wait_until_connected(&ctx.cancel).await {
            return None;
        }
        task::fetch_and_store(ctx, key).await
    }

    async fn dispatch(&self, ctx: &Arc<FetchContext>, keys: impl Iterator<Item = ResourceKey>) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_fetches));
        let mut tasks = JoinSet::new();
        let mut dispatched = 0_usize;

        for key in keys {
            if ctx.cancel.is_cancelled() {
                debug!(region_id = %ctx.id, "cancelled, no new fetches");
                break;
            }
            match self.store.has_resource(ctx.id, &key).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    ctx.fail(RegionErrorKind::Store, e.to_string());
                    break;
                }
            }
            if !self.wait_until_connected(&ctx.cancel).await {
                break;
            }

            // Race the permit against cancellation so a full pool doesn't delay a pause.
            let permit = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!(region_id = %ctx.id, "fetch semaphore closed");
                        break;
                    }
                },
            };

            debug!(region_id = %ctx.id, key = %key, "dispatching fetch");
            let task_ctx = Arc::clone(ctx);
            tasks.spawn(async move {
                let _permit = permit;
                task::fetch_and_store(&task_ctx, key).await;
            });
            dispatched += 1;

            while let Some(result) = tasks.try_join_next() {
                log_join_error(ctx.id, result);
            }
        }

        debug!(
            region_id = %ctx.id,
            dispatched,
            in_flight = tasks.len(),
            "dispatch finished, draining"
        );

        let abort = self.config.pause_policy == PausePolicy::Abort
            && tokio::select! {
                () = ctx.cancel.cancelled() => true,
                () = drain(ctx.id, &mut tasks) => false,
            };
        if abort {
            debug!(region_id = %ctx.id, in_flight = tasks.len(), "aborting in-flight fetches");
            tasks.abort_all();
        }
        drain(ctx.id, &mut tasks).await;
    }

    /// Waits for connectivity. Returns `false` if cancelled first.
    async fn wait_until_connected(&self, cancel: &CancelFlag) -> bool {
        let mut announced = false;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if self.connectivity.is_connected() {
                if announced {
                    info!("connectivity restored, resuming");
                }
                return true;
            }
            if !announced {
                info!("offline, waiting for connectivity");
                announced = true;
            }
            tokio::select! {
                () = cancel.cancelled() => return false,
                () = tokio::time::sleep(self.config.offline_poll_interval) => {}
            }
        }
    }
}

async fn drain(id: RegionId, tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        log_join_error(id, result);
    }
}

fn log_join_error(id: RegionId, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result
        && !e.is_cancelled()
    {
        warn!(region_id = %id, error = %e, "fetch task panicked");
    }
}
