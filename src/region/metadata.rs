//! Caller-supplied region metadata.
//!
//! The core never interprets metadata bytes. [`RegionMetadata::from_region_name`]
//! is a convenience encoding that stores a display name as a small JSON
//! object so region lists can be labelled.

use serde::{Deserialize, Serialize};

use super::error::MetadataError;

/// JSON field holding the region name in the name encoding.
pub const FIELD_REGION_NAME: &str = "FIELD_REGION_NAME";

#[derive(Serialize, Deserialize)]
struct NamedRegion {
    #[serde(rename = "FIELD_REGION_NAME")]
    name: String,
}

/// Opaque metadata blob stored alongside a region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMetadata(Vec<u8>);

impl RegionMetadata {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Encodes a region name as `{"FIELD_REGION_NAME": name}`.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::EmptyName`] for empty or whitespace-only names.
    pub fn from_region_name(name: &str) -> Result<Self, MetadataError> {
        if name.trim().is_empty() {
            return Err(MetadataError::EmptyName);
        }
        let encoded = serde_json::to_vec(&NamedRegion {
            name: name.to_string(),
        })?;
        Ok(Self(encoded))
    }

    /// Decodes the region name, if this blob uses the name encoding.
    #[must_use]
    pub fn region_name(&self) -> Option<String> {
        serde_json::from_slice::<NamedRegion>(&self.0)
            .ok()
            .map(|named| named.name)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for RegionMetadata {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_region_name_encoding() {
        let metadata = RegionMetadata::from_region_name("Manhattan").unwrap();
        assert_eq!(
            std::str::from_utf8(metadata.as_bytes()).unwrap(),
            r#"{"FIELD_REGION_NAME":"Manhattan"}"#
        );
        assert_eq!(metadata.region_name().as_deref(), Some("Manhattan"));
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            RegionMetadata::from_region_name("  "),
            Err(MetadataError::EmptyName)
        ));
    }

    #[test]
    fn test_foreign_blob_has_no_name() {
        let metadata = RegionMetadata::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(metadata.region_name(), None);
        assert_eq!(metadata.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
    }
}
