//! Download state and progress snapshot for a region.

use std::fmt;

/// Whether a region is currently downloading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DownloadState {
    /// Idle: never started, paused, cancelled, finished, or failed.
    #[default]
    Inactive,
    /// A download is in progress.
    Active,
}

impl DownloadState {
    /// Returns the stable string label used for persistence.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
        }
    }

    /// Parses a persisted label; unknown labels read as inactive.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label {
            "active" => Self::Active,
            _ => Self::Inactive,
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress snapshot delivered to observers.
///
/// `required_resource_count` is an estimate until the style has been read;
/// [`is_required_count_precise`](Self::is_required_count_precise) tells the
/// two apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionStatus {
    pub download_state: DownloadState,
    pub required_resource_count: u64,
    pub completed_resource_count: u64,
    pub completed_resource_bytes: u64,
    pub is_required_count_precise: bool,
}

impl RegionStatus {
    /// True once every required resource is stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.is_required_count_precise
            && self.completed_resource_count >= self.required_resource_count
    }

    /// Completion percentage, `0.0` until the required count is precise.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percentage(&self) -> f64 {
        if !self.is_required_count_precise || self.required_resource_count == 0 {
            return 0.0;
        }
        100.0 * self.completed_resource_count as f64 / self.required_resource_count as f64
    }
}
