//! Per-resource fetch task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use super::CancelFlag;
use super::progress::StatusEvent;
use crate::download::{ResourceFetcher, TileCountLimit};
use crate::region::{RegionErrorKind, ResourceKey};
use crate::store::{RegionId, RegionStore};

/// Everything a fetch task of one activation needs.
pub(super) struct FetchContext {
    pub(super) id: RegionId,
    pub(super) store: Arc<dyn RegionStore>,
    pub(super) fetcher: ResourceFetcher,
    pub(super) timeout: Duration,
    pub(super) tile_limit: Arc<TileCountLimit>,
    pub(super) cancel: CancelFlag,
    pub(super) events: mpsc::UnboundedSender<StatusEvent>,
}

impl FetchContext {
    /// Ends the activation with an error, unless it has already ended.
    pub(super) fn fail(&self, kind: RegionErrorKind, message: impl Into<String>) {
        let message = message.into();
        if self.cancel.cancel() {
            warn!(region_id = %self.id, %kind, %message, "region download failed");
            let _ = self.events.send(StatusEvent::Failed { kind, message });
        } else {
            debug!(region_id = %self.id, %message, "failure after cancellation ignored");
        }
    }

    fn limit_exceeded(&self, limit: u64) {
        if self.cancel.cancel() {
            warn!(region_id = %self.id, limit, "tile count limit exceeded");
            let _ = self.events.send(StatusEvent::TileLimitExceeded(limit));
        }
    }
}

/// One reserved slot under the tile count limit, returned on drop unless committed.
struct TileReservation<'a> {
    limit: &'a TileCountLimit,
    committed: bool,
}

impl<'a> TileReservation<'a> {
    fn acquire(limit: &'a TileCountLimit) -> Result<Self, u64> {
        limit.try_acquire()?;
        Ok(Self {
            limit,
            committed: false,
        })
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for TileReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.limit.release();
        }
    }
}

/// Fetches `key` and persists it.
///
/// Returns the body when the resource is stored (or was already), `None` when
/// the fetch failed, the activation was cancelled, or the tile limit was hit.
#[instrument(level = "debug", skip(ctx, key), fields(region_id = %ctx.id, key = %key))]
pub(super) async fn fetch_and_store(ctx: &FetchContext, key: ResourceKey) -> Option<Vec<u8>> {
    let fetched = match ctx.fetcher.fetch(key.url(), ctx.timeout).await {
        Ok(fetched) => fetched,
        Err(e) => {
            ctx.fail(e.kind(), e.to_string());
            return None;
        }
    };

    if ctx.cancel.is_cancelled() {
        debug!("discarding resource fetched after cancellation");
        return None;
    }

    let reservation = if key.is_tile() {
        match TileReservation::acquire(&ctx.tile_limit) {
            Ok(reservation) => Some(reservation),
            Err(limit) => {
                ctx.limit_exceeded(limit);
                return None;
            }
        }
    } else {
        None
    };

    match ctx.store.put_resource(ctx.id, &key, &fetched.bytes).await {
        Ok(true) => {
            if let Some(reservation) = reservation {
                reservation.commit();
            }
            debug!(
                attempts = fetched.attempts,
                bytes = fetched.bytes.len(),
                "resource stored"
            );
            let _ = ctx.events.send(StatusEvent::Completed {
                bytes: fetched.bytes.len() as u64,
            });
            Some(fetched.bytes)
        }
        Ok(false) => {
            debug!("resource was already stored");
            Some(fetched.bytes)
        }
        Err(e) => {
            drop(reservation);
            ctx.fail(RegionErrorKind::Store, e.to_string());
            None
        }
    }
}
