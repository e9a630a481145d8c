//! Resource keys and slippy-map tile cover.
//!
//! Every resource an offline region needs is identified by a [`ResourceKey`]:
//! the URL it is fetched from plus a [`ResourceKind`] tag. Tile keys also
//! carry their [`TileCoord`] so the tile count limit can tell them apart
//! and so ordering by `(zoom, x, y)` is explicit.

use std::f64::consts::PI;
use std::fmt;

/// Maximum latitude representable in Web Mercator.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Kind tag for a required resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// The style JSON document.
    Style,
    /// Sprite sheet image or index.
    Sprite,
    /// A glyph range for one font stack.
    Glyph,
    /// A map tile.
    Tile,
}

impl ResourceKind {
    /// Returns the stable string label used for persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Sprite => "sprite",
            Self::Glyph => "glyph",
            Self::Tile => "tile",
        }
    }

    /// Parses a persisted label back into a kind.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "style" => Some(Self::Style),
            "sprite" => Some(Self::Sprite),
            "glyph" => Some(Self::Glyph),
            "tile" => Some(Self::Tile),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slippy-map tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Zoom level.
    pub z: u8,
    /// Column, west to east.
    pub x: u32,
    /// Row, north to south.
    pub y: u32,
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Opaque identifier for one required resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    kind: ResourceKind,
    url: String,
    tile: Option<TileCoord>,
}

impl ResourceKey {
    /// Key for the style document.
    pub fn style(url: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Style,
            url: url.into(),
            tile: None,
        }
    }

    /// Key for a sprite image or index.
    pub fn sprite(url: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Sprite,
            url: url.into(),
            tile: None,
        }
    }

    /// Key for a glyph range.
    pub fn glyph(url: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Glyph,
            url: url.into(),
            tile: None,
        }
    }

    /// Key for a tile at `coord`.
    pub fn tile(url: impl Into<String>, coord: TileCoord) -> Self {
        Self {
            kind: ResourceKind::Tile,
            url: url.into(),
            tile: Some(coord),
        }
    }

    /// Rebuilds a key from persisted parts.
    #[must_use]
    pub fn from_parts(kind: ResourceKind, url: String) -> Self {
        Self {
            kind,
            url,
            tile: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Tile coordinate, for tile keys built from a definition.
    #[must_use]
    pub fn tile_coord(&self) -> Option<TileCoord> {
        self.tile
    }

    #[must_use]
    pub fn is_tile(&self) -> bool {
        self.kind == ResourceKind::Tile
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.url)
    }
}

/// Converts a longitude to a tile column at `zoom`, clamped to the grid.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lon_to_x(lon: f64, zoom: u8) -> u32 {
    let n = f64::from(1_u32 << zoom);
    let x = ((lon + 180.0) / 360.0 * n).floor();
    x.clamp(0.0, n - 1.0) as u32
}

/// Converts a latitude to a tile row at `zoom`, clamped to the grid.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lat_to_y(lat: f64, zoom: u8) -> u32 {
    let n = f64::from(1_u32 << zoom);
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let lat_rad = lat * PI / 180.0;
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();
    y.clamp(0.0, n - 1.0) as u32
}

/// Rectangle of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Number of tiles in the range. At most `4^22`, so it always fits.
    #[must_use]
    pub fn len(&self) -> u64 {
        (u64::from(self.max_x - self.min_x) + 1) * (u64::from(self.max_y - self.min_y) + 1)
    }

    /// Never true: a range always holds at least one tile.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Tiles in the range, sorted by `(x, y)`, produced on demand.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + use<> {
        let Self {
            zoom,
            min_x,
            max_x,
            min_y,
            max_y,
        } = *self;
        (min_x..=max_x).flat_map(move |x| (min_y..=max_y).map(move |y| TileCoord { z: zoom, x, y }))
    }
}

/// Returns the tiles covering a bounding box at one zoom.
#[must_use]
pub fn tile_cover(south: f64, west: f64, north: f64, east: f64, zoom: u8) -> TileRange {
    TileRange {
        zoom,
        min_x: lon_to_x(west, zoom),
        max_x: lon_to_x(east, zoom),
        min_y: lat_to_y(north, zoom),
        max_y: lat_to_y(south, zoom),
    }
}
