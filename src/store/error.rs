//! Error types for region persistence.

use thiserror::Error;

use super::RegionId;
use crate::region::DefinitionError;

/// Errors returned by [`RegionStore`](super::RegionStore) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No region with this id exists.
    #[error("region {id} not found")]
    RegionNotFound {
        /// The missing region.
        id: RegionId,
    },

    /// Region is persisted as active and cannot be deleted.
    #[error("region {id} is active")]
    RegionActive {
        /// The active region.
        id: RegionId,
    },

    /// A persisted row could not be turned back into a region.
    #[error("region {id} has an invalid record: {reason}")]
    InvalidRecord {
        /// The offending region.
        id: RegionId,
        /// What was wrong with it.
        reason: String,
    },

    /// SQLite query failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure reported by a custom store backend.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn invalid_record(id: RegionId, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            id,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_definition(id: RegionId, error: &DefinitionError) -> Self {
        Self::invalid_record(id, error.to_string())
    }
}
