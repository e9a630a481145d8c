//! Ceiling on stored tiles across every region.
//!
//! Tiles are reserved before they are persisted, so concurrent fetch tasks
//! from several regions can never overshoot the limit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::debug;

const UNLIMITED: u64 = u64::MAX;

static GLOBAL: OnceLock<Arc<TileCountLimit>> = OnceLock::new();

/// Shared tile counter with an optional ceiling.
#[derive(Debug)]
pub struct TileCountLimit {
    limit: AtomicU64,
    count: AtomicU64,
}

impl Default for TileCountLimit {
    fn default() -> Self {
        Self::new(None)
    }
}

impl TileCountLimit {
    /// Creates a counter starting at zero. `None` means unlimited.
    #[must_use]
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit: AtomicU64::new(limit.unwrap_or(UNLIMITED)),
            count: AtomicU64::new(0),
        }
    }

    /// The process-wide instance used by [`OfflineManager::open`](crate::OfflineManager::open).
    #[must_use]
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::default())))
    }

    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        match self.limit.load(Ordering::SeqCst) {
            UNLIMITED => None,
            limit => Some(limit),
        }
    }

    pub fn set_limit(&self, limit: Option<u64>) {
        self.limit
            .store(limit.unwrap_or(UNLIMITED), Ordering::SeqCst);
        debug!(?limit, "tile count limit updated");
    }

    /// Tiles currently counted against the limit.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Replaces the count, typically with the number of tiles already persisted.
    pub fn set_count(&self, count: u64) {
        self.count.store(count, Ordering::SeqCst);
    }

    /// Reserves one tile.
    ///
    /// # Errors
    ///
    /// Returns `Err(limit)` when the reservation would exceed the limit; the
    /// count is left unchanged.
    pub fn try_acquire(&self) -> Result<(), u64> {
        let limit = self.limit.load(Ordering::SeqCst);
        self.count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < limit).then_some(count + 1)
            })
            .map(|_| ())
            .map_err(|_| limit)
    }

    /// Returns one reservation, e.g. after a failed write or a region delete.
    pub fn release(&self) {
        self.release_many(1);
    }

    pub fn release_many(&self, tiles: u64) {
        // Saturating so a stale count can never wrap.
        let _ = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(tiles))
            });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_by_default() {
        let limit = TileCountLimit::default();
        assert_eq!(limit.limit(), None);
        for _ in 0..1000 {
            limit.try_acquire().unwrap();
        }
        assert_eq!(limit.count(), 1000);
    }

    #[test]
    fn test_acquire_stops_at_limit() {
        let limit = TileCountLimit::new(Some(5));
        for _ in 0..5 {
            limit.try_acquire().unwrap();
        }
        assert_eq!(limit.try_acquire(), Err(5));
        assert_eq!(limit.count(), 5);

        limit.release();
        assert!(limit.try_acquire().is_ok());
    }

    #[test]
    fn test_existing_count_counts_against_limit() {
        let limit = TileCountLimit::new(Some(3));
        limit.set_count(3);
        assert_eq!(limit.try_acquire(), Err(3));

        limit.set_limit(None);
        assert!(limit.try_acquire().is_ok());
    }

    #[test]
    fn test_release_saturates_at_zero() {
        let limit = TileCountLimit::new(Some(2));
        limit.release_many(10);
        assert_eq!(limit.count(), 0);
    }

    #[test]
    fn test_concurrent_acquire_never_overshoots() {
        let limit = Arc::new(TileCountLimit::new(Some(50)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limit = Arc::clone(&limit);
                std::thread::spawn(move || (0..20).filter(|_| limit.try_acquire().is_ok()).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
        assert_eq!(limit.count(), 50);
    }
}
