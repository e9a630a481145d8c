//! Sprite and glyph discovery from a fetched style document.
//!
//! Only the fields that name downloadable resources are read: the top-level
//! `sprite` and `glyphs` URLs and the font stacks used by symbol layers.
//! Everything else in the style is ignored.

use std::collections::{BTreeSet, HashSet};

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::definition::ratio_suffix;
use super::resource::ResourceKey;

/// Font stack used by symbol layers that set `text-field` without `text-font`.
pub const DEFAULT_FONT_STACK: &str = "Open Sans Regular,Arial Unicode MS Regular";

/// Number of 256-codepoint glyph ranges covering the Basic Multilingual Plane.
const GLYPH_RANGE_COUNT: u32 = 256;

#[derive(Debug, Deserialize)]
struct StyleDocument {
    sprite: Option<String>,
    glyphs: Option<String>,
    #[serde(default)]
    layers: Vec<StyleLayer>,
}

#[derive(Debug, Deserialize)]
struct StyleLayer {
    layout: Option<Value>,
}

/// Sprite and glyph resources referenced by a style.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleResources {
    keys: Vec<ResourceKey>,
}

impl StyleResources {
    /// Reads sprite/glyph references out of style JSON.
    ///
    /// Relative URLs resolve against `style_url`. Sprite keys come first
    /// (index then image), then glyph ranges per font stack in sorted order.
    /// A template that expands to the same URL twice yields one key.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when `bytes` is not a style object.
    pub fn from_style_json(
        style_url: &str,
        bytes: &[u8],
        pixel_ratio: f32,
    ) -> Result<Self, serde_json::Error> {
        let doc: StyleDocument = serde_json::from_slice(bytes)?;
        let base = Url::parse(style_url).ok();
        let mut keys = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |key: ResourceKey| {
            if seen.insert(key.url().to_string()) {
                keys.push(key);
            }
        };

        if let Some(sprite) = doc.sprite.as_deref() {
            let ratio = ratio_suffix(pixel_ratio);
            for ext in ["json", "png"] {
                let url = resolve(base.as_ref(), &format!("{sprite}{ratio}.{ext}"));
                push(ResourceKey::sprite(url));
            }
        }

        if let Some(template) = doc.glyphs.as_deref() {
            for stack in font_stacks(&doc.layers) {
                let encoded = urlencoding::encode(&stack);
                for range in 0..GLYPH_RANGE_COUNT {
                    let start = range * 256;
                    let expanded = template
                        .replace("{fontstack}", &encoded)
                        .replace("{range}", &format!("{start}-{}", start + 255));
                    push(ResourceKey::glyph(resolve(base.as_ref(), &expanded)));
                }
            }
        }

        Ok(Self { keys })
    }

    /// Sprite and glyph keys in download order.
    #[must_use]
    pub fn keys(&self) -> &[ResourceKey] {
        &self.keys
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn resolve(base: Option<&Url>, reference: &str) -> String {
    match base.and_then(|base| base.join(reference).ok()) {
        Some(url) => url.to_string(),
        None => reference.to_string(),
    }
}

/// Distinct font stacks named by layer layouts, sorted.
fn font_stacks(layers: &[StyleLayer]) -> BTreeSet<String> {
    let mut stacks = BTreeSet::new();
    for layout in layers.iter().filter_map(|layer| layer.layout.as_ref()) {
        match layout.get("text-font") {
            Some(Value::Array(fonts)) => {
                let names: Vec<&str> = fonts.iter().filter_map(Value::as_str).collect();
                if !names.is_empty() {
                    stacks.insert(names.join(","));
                }
            }
            Some(_) => {}
            None => {
                if layout.get("text-field").is_some() {
                    stacks.insert(DEFAULT_FONT_STACK.to_string());
                }
            }
        }
    }
    stacks
}
