//! Error types for region definitions and region lifecycle operations.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::{RegionId, StoreError};

/// Reasons a [`RegionDefinition`](super::RegionDefinition) is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum DefinitionError {
    /// Style URL is empty or not an absolute URL.
    #[error("invalid style URL: {url:?}")]
    InvalidStyleUrl {
        /// The rejected URL.
        url: String,
    },

    /// Tile URL template lacks one of the `{z}`, `{x}`, `{y}` placeholders.
    #[error("tile URL template {template:?} must contain {{z}}, {{x}} and {{y}}")]
    InvalidTileTemplate {
        /// The rejected template.
        template: String,
    },

    /// Bounds are out of range, inverted, or have zero area.
    #[error(
        "degenerate bounds: south={south}, west={west}, north={north}, east={east}"
    )]
    DegenerateBounds {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
    },

    /// Zoom range is negative, inverted, non-finite, or beyond the maximum zoom.
    #[error("invalid zoom range {min_zoom}..={max_zoom}")]
    InvalidZoomRange { min_zoom: f64, max_zoom: f64 },

    /// Pixel ratio must be finite and strictly positive.
    #[error("invalid pixel ratio {0}")]
    InvalidPixelRatio(f32),
}

/// Errors from region metadata encoding.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Region names must not be empty.
    #[error("region name cannot be empty")]
    EmptyName,

    /// JSON encoding of the metadata failed.
    #[error("failed to encode region metadata: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from [`OfflineRegion`](super::OfflineRegion) and
/// [`OfflineManager`](crate::OfflineManager) operations.
#[derive(Debug, Error)]
pub enum RegionError {
    /// Definition rejected at creation.
    #[error("invalid region definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    /// Region is downloading and force was not requested.
    #[error("region {id} is busy downloading")]
    RegionBusy {
        /// Region that is still active.
        id: RegionId,
    },

    /// Persistence failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Manager opened with an invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_bounds_display_lists_edges() {
        let error = DefinitionError::DegenerateBounds {
            south: 1.0,
            west: 2.0,
            north: 1.0,
            east: 3.0,
        };
        let msg = error.to_string();
        assert!(msg.contains("south=1"), "unexpected message: {msg}");
        assert!(msg.contains("east=3"), "unexpected message: {msg}");
    }

    #[test]
    fn test_region_busy_display_contains_id() {
        let error = RegionError::RegionBusy { id: RegionId(7) };
        assert!(error.to_string().contains("region 7"));
    }
}
