//! Status actor: the only writer of an activation's progress.
//!
//! Fetch tasks and the driver send [`StatusEvent`]s; the actor applies them
//! in arrival order, mirrors the counters into the region handle and calls
//! the observer. It holds only a weak reference to the region.

use std::sync::{Arc, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::CancelFlag;
use crate::region::{DownloadState, RegionErrorKind, RegionShared, RegionStatus};
use crate::store::{RegionId, RegionStore};

#[derive(Debug)]
pub(super) enum StatusEvent {
    /// Durable status at activation start.
    Begin(RegionStatus),
    Required {
        count: u64,
        precise: bool,
    },
    /// One resource was persisted.
    Completed {
        bytes: u64,
    },
    Failed {
        kind: RegionErrorKind,
        message: String,
    },
    TileLimitExceeded(u64),
    /// No fetch task is left running.
    Drained,
}

pub(super) struct StatusActor {
    region: Weak<RegionShared>,
    id: RegionId,
    generation: u64,
    cancel: CancelFlag,
    store: Arc<dyn RegionStore>,
    status: RegionStatus,
    ended: bool,
}

impl StatusActor {
    pub(super) fn new(
        region: Weak<RegionShared>,
        id: RegionId,
        generation: u64,
        cancel: CancelFlag,
        store: Arc<dyn RegionStore>,
    ) -> Self {
        Self {
            region,
            id,
            generation,
            cancel,
            store,
            status: RegionStatus::default(),
            ended: false,
        }
    }

    pub(super) async fn run(mut self, mut events: mpsc::UnboundedReceiver<StatusEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
    }

    async fn handle(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::Begin(status) => {
                self.status = status;
                self.status.download_state = DownloadState::Active;
                self.publish();
                self.deliver_progress();
            }
            StatusEvent::Required { count, precise } => {
                self.status.required_resource_count = count;
                self.status.is_required_count_precise = precise;
                self.publish();
                if !self.try_complete() {
                    self.deliver_progress();
                }
            }
            StatusEvent::Completed { bytes } => {
                self.status.completed_resource_count += 1;
                self.status.completed_resource_bytes += bytes;
                self.publish();
                if !self.try_complete() {
                    self.deliver_progress();
                }
            }
            StatusEvent::Failed { kind, message } => {
                if self.end()
                    && let Some(observer) = self.observer()
                {
                    observer.on_error(kind, &message);
                }
            }
            StatusEvent::TileLimitExceeded(limit) => {
                if self.end()
                    && let Some(observer) = self.observer()
                {
                    observer.on_tile_count_limit_exceeded(limit);
                }
            }
            StatusEvent::Drained => self.on_drained().await,
        }
    }

    /// Ends the activation as complete if every required resource is stored.
    fn try_complete(&mut self) -> bool {
        if self.ended || !self.status.is_complete() {
            return false;
        }
        // Losing the race means a pause or failure already ended the activation.
        if !self.cancel.cancel() {
            return false;
        }
        self.end();
        info!(
            region_id = %self.id,
            resources = self.status.completed_resource_count,
            bytes = self.status.completed_resource_bytes,
            "region download complete"
        );
        self.deliver(&self.status);
        true
    }

    async fn on_drained(&mut self) {
        if self.ended {
            return;
        }

        if self.cancel.is_cancelled() {
            self.end();
            debug!(region_id = %self.id, "activation drained after pause");
            let deliver = self
                .region
                .upgrade()
                .is_some_and(|region| region.deliver_inactive_messages());
            if deliver {
                self.deliver(&self.status);
            }
            return;
        }

        // Everything ran without tripping completion, e.g. every resource was
        // already stored. The durable counters are authoritative.
        match self.store.get_status(self.id).await {
            Ok(durable) => {
                self.status.completed_resource_count = self
                    .status
                    .completed_resource_count
                    .max(durable.completed_resource_count);
                self.status.completed_resource_bytes = self
                    .status
                    .completed_resource_bytes
                    .max(durable.completed_resource_bytes);
            }
            Err(e) => {
                warn!(region_id = %self.id, error = %e, "failed to reconcile status");
            }
        }
        self.cancel.cancel();
        self.end();
        info!(
            region_id = %self.id,
            complete = self.status.is_complete(),
            "region download finished"
        );
        self.deliver(&self.status);
    }

    /// Marks the activation ended. Returns `false` if it already was.
    fn end(&mut self) -> bool {
        if self.ended {
            return false;
        }
        self.ended = true;
        self.status.download_state = DownloadState::Inactive;
        self.publish();
        true
    }

    fn publish(&self) {
        if let Some(region) = self.region.upgrade() {
            region.publish_status(self.generation, &self.status);
        }
    }

    fn deliver_progress(&self) {
        if !self.cancel.is_cancelled() {
            self.deliver(&self.status);
        }
    }

    fn deliver(&self, status: &RegionStatus) {
        if let Some(observer) = self.observer() {
            observer.on_status_changed(status);
        }
    }

    fn observer(&self) -> Option<Arc<dyn crate::region::RegionObserver>> {
        self.region.upgrade()?.observer.current()
    }
}
