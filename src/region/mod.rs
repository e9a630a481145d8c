//! Offline regions: what to download and the handle that downloads it.
//!
//! - [`RegionDefinition`] describes the area, zoom range and style
//! - [`ResourceKey`] names one resource the region needs
//! - [`OfflineRegion`] owns a region's download lifecycle and observer
//! - [`RegionStatus`] is the progress snapshot observers receive

mod definition;
mod error;
mod metadata;
mod observer;
mod offline_region;
mod resource;
mod status;
mod style;

pub use definition::{LatLngBounds, MAX_ZOOM, RegionDefinition, ratio_suffix};
pub use error::{DefinitionError, MetadataError, RegionError};
pub use metadata::{FIELD_REGION_NAME, RegionMetadata};
pub use observer::{ChannelObserver, RegionErrorKind, RegionEvent, RegionObserver};
pub use offline_region::OfflineRegion;
pub use resource::{MAX_MERCATOR_LAT, ResourceKey, ResourceKind, TileCoord, TileRange, tile_cover};
pub use status::{DownloadState, RegionStatus};
pub use style::{DEFAULT_FONT_STACK, StyleResources};

pub(crate) use offline_region::RegionShared;
