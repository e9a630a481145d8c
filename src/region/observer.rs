//! Observer contract for region download progress.
//!
//! Callbacks run on the region's status task, never on the thread that
//! called [`OfflineRegion::set_download_state`](super::OfflineRegion::set_download_state).
//! Use [`ChannelObserver`] to move events onto a context of your choosing.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use super::status::RegionStatus;

/// Category of a region-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionErrorKind {
    /// Retries exhausted on timeouts or transient transport errors.
    FetchTransient,
    /// Permanent failure: 4xx response or unusable content.
    FetchPermanent,
    /// Persistence failed.
    Store,
}

impl fmt::Display for RegionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FetchTransient => "fetch_transient",
            Self::FetchPermanent => "fetch_permanent",
            Self::Store => "store",
        };
        f.write_str(label)
    }
}

/// Receives download progress and terminal events for one region.
pub trait RegionObserver: Send + Sync {
    /// Called with each progress snapshot, including the final one.
    fn on_status_changed(&self, status: &RegionStatus);

    /// Called at most once per activation when the download fails.
    fn on_error(&self, kind: RegionErrorKind, message: &str);

    /// Called at most once per activation when the tile limit stops the download.
    fn on_tile_count_limit_exceeded(&self, limit: u64);
}

/// Single replaceable observer reference.
///
/// Delivery clones the current handler out of the slot first, so a handler
/// detached mid-flight simply stops receiving events.
#[derive(Default)]
pub(crate) struct ObserverSlot {
    observer: RwLock<Option<Arc<dyn RegionObserver>>>,
}

impl ObserverSlot {
    pub(crate) fn set(&self, observer: Option<Arc<dyn RegionObserver>>) {
        *self.observer.write().unwrap_or_else(PoisonError::into_inner) = observer;
    }

    pub(crate) fn current(&self) -> Option<Arc<dyn RegionObserver>> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.current().is_some()
    }
}

impl fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("attached", &self.is_set())
            .finish()
    }
}

/// Observer callback, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionEvent {
    StatusChanged(RegionStatus),
    Error {
        kind: RegionErrorKind,
        message: String,
    },
    TileCountLimitExceeded(u64),
}

/// Observer that forwards every callback into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<RegionEvent>,
}

impl ChannelObserver {
    /// Creates the observer and the receiving half of its channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RegionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RegionObserver for ChannelObserver {
    fn on_status_changed(&self, status: &RegionStatus) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(RegionEvent::StatusChanged(*status));
    }

    fn on_error(&self, kind: RegionErrorKind, message: &str) {
        let _ = self.tx.send(RegionEvent::Error {
            kind,
            message: message.to_string(),
        });
    }

    fn on_tile_count_limit_exceeded(&self, limit: u64) {
        let _ = self.tx.send(RegionEvent::TileCountLimitExceeded(limit));
    }
}
