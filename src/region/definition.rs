//! Immutable description of an offline region.
//!
//! A [`RegionDefinition`] is a tile pyramid: a bounding box, a zoom range,
//! a style, and the pixel ratio of the target display. It enumerates the
//! resources a download must fetch, in a fixed order:
//!
//! 1. the style document
//! 2. sprites and glyphs named by the style (only once the style is known)
//! 3. tiles, sorted by `(zoom, x, y)`

use std::collections::HashSet;

use url::Url;

use super::error::DefinitionError;
use super::resource::{ResourceKey, TileCoord, TileRange, tile_cover};
use super::style::StyleResources;

/// Highest zoom level a definition may request.
pub const MAX_ZOOM: f64 = 22.0;

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLngBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl LatLngBounds {
    #[must_use]
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        let in_range = (-90.0..=90.0).contains(&self.south)
            && (-90.0..=90.0).contains(&self.north)
            && (-180.0..=180.0).contains(&self.west)
            && (-180.0..=180.0).contains(&self.east);
        // NaN fails every comparison, so it lands here too.
        if !in_range || !(self.south < self.north) || !(self.west < self.east) {
            return Err(DefinitionError::DegenerateBounds {
                south: self.south,
                west: self.west,
                north: self.north,
                east: self.east,
            });
        }
        Ok(())
    }
}

/// Immutable tile-pyramid region description.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionDefinition {
    style_url: String,
    tile_url_template: String,
    bounds: LatLngBounds,
    min_zoom: f64,
    max_zoom: f64,
    pixel_ratio: f32,
}

impl RegionDefinition {
    /// Creates a validated definition.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the style URL is not absolute, the
    /// template lacks `{z}`/`{x}`/`{y}`, the bounds are degenerate, the zoom
    /// range is invalid, or the pixel ratio is not positive.
    pub fn new(
        style_url: impl Into<String>,
        tile_url_template: impl Into<String>,
        bounds: LatLngBounds,
        min_zoom: f64,
        max_zoom: f64,
        pixel_ratio: f32,
    ) -> Result<Self, DefinitionError> {
        let style_url = style_url.into();
        let tile_url_template = tile_url_template.into();

        if Url::parse(&style_url).is_err() {
            return Err(DefinitionError::InvalidStyleUrl { url: style_url });
        }
        if !["{z}", "{x}", "{y}"]
            .iter()
            .all(|placeholder| tile_url_template.contains(placeholder))
        {
            return Err(DefinitionError::InvalidTileTemplate {
                template: tile_url_template,
            });
        }
        bounds.validate()?;
        if !(min_zoom.is_finite() && max_zoom.is_finite())
            || min_zoom < 0.0
            || max_zoom < min_zoom
            || max_zoom > MAX_ZOOM
        {
            return Err(DefinitionError::InvalidZoomRange { min_zoom, max_zoom });
        }
        if !pixel_ratio.is_finite() || pixel_ratio <= 0.0 {
            return Err(DefinitionError::InvalidPixelRatio(pixel_ratio));
        }

        Ok(Self {
            style_url,
            tile_url_template,
            bounds,
            min_zoom,
            max_zoom,
            pixel_ratio,
        })
    }

    #[must_use]
    pub fn style_url(&self) -> &str {
        &self.style_url
    }

    #[must_use]
    pub fn tile_url_template(&self) -> &str {
        &self.tile_url_template
    }

    #[must_use]
    pub fn bounds(&self) -> LatLngBounds {
        self.bounds
    }

    #[must_use]
    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    #[must_use]
    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    #[must_use]
    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// Integer zoom levels covered, `ceil(min_zoom)..=floor(max_zoom)`.
    ///
    /// Empty when the range contains no integer (e.g. `1.2..=1.8`).
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::reversed_empty_ranges
    )]
    pub fn zoom_levels(&self) -> std::ops::RangeInclusive<u8> {
        let first = self.min_zoom.ceil() as u8;
        let last = self.max_zoom.floor() as u8;
        if first > last {
            return 1..=0;
        }
        first..=last
    }

    /// Key of the style document.
    #[must_use]
    pub fn style_key(&self) -> ResourceKey {
        ResourceKey::style(self.style_url.clone())
    }

    /// Tile rectangles covering the bounds, one per zoom level.
    pub fn tile_ranges(&self) -> impl Iterator<Item = TileRange> + '_ {
        let b = self.bounds;
        self.zoom_levels()
            .map(move |zoom| tile_cover(b.south, b.west, b.north, b.east, zoom))
    }

    /// Number of tiles covering the bounds, computed without enumerating them.
    #[must_use]
    pub fn tile_count(&self) -> u64 {
        self.tile_ranges()
            .fold(0_u64, |total, range| total.saturating_add(range.len()))
    }

    /// Tile keys covering the bounds, sorted by `(zoom, x, y)`.
    ///
    /// Keys are built on demand; a world-wide region at high zoom is never
    /// held in memory.
    pub fn tile_resources(&self) -> impl Iterator<Item = ResourceKey> + '_ {
        self.tile_ranges()
            .flat_map(|range| range.iter())
            .map(|coord| ResourceKey::tile(self.tile_url(coord), coord))
    }

    /// Resources known before the style has been fetched: the style key
    /// followed by every tile.
    pub fn required_resources(&self) -> impl Iterator<Item = ResourceKey> + '_ {
        std::iter::once(self.style_key()).chain(self.tile_resources())
    }

    /// Length of [`required_resources`](Self::required_resources).
    #[must_use]
    pub fn required_resource_count(&self) -> u64 {
        self.tile_count().saturating_add(1)
    }

    /// Full ordered resource set once the style's sprite and glyph
    /// references are known. Each URL appears once, at its first position.
    pub fn required_resources_with(
        &self,
        style: &StyleResources,
    ) -> impl Iterator<Item = ResourceKey> + '_ {
        self.leading_keys(style)
            .into_iter()
            .chain(self.tile_resources())
    }

    /// Length of [`required_resources_with`](Self::required_resources_with).
    #[must_use]
    pub fn required_resource_count_with(&self, style: &StyleResources) -> u64 {
        (self.leading_keys(style).len() as u64).saturating_add(self.tile_count())
    }

    /// Style, sprite and glyph keys with repeated URLs dropped.
    ///
    /// Tile URLs are distinct from each other since the template carries
    /// `{z}`, `{x}` and `{y}`.
    fn leading_keys(&self, style: &StyleResources) -> Vec<ResourceKey> {
        let mut seen = HashSet::new();
        std::iter::once(self.style_key())
            .chain(style.keys().iter().cloned())
            .filter(|key| seen.insert(key.url().to_string()))
            .collect()
    }

    /// Expands the tile template for one coordinate.
    #[must_use]
    pub fn tile_url(&self, coord: TileCoord) -> String {
        self.tile_url_template
            .replace("{z}", &coord.z.to_string())
            .replace("{x}", &coord.x.to_string())
            .replace("{y}", &coord.y.to_string())
            .replace("{ratio}", ratio_suffix(self.pixel_ratio))
    }
}

/// URL suffix selecting high-density assets.
#[must_use]
pub fn ratio_suffix(pixel_ratio: f32) -> &'static str {
    if pixel_ratio > 1.0 { "@2x" } else { "" }
}
