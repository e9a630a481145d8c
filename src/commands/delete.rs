//! `delete` command.

use std::path::Path;

use anyhow::{Context, Result};
use offline_regions::{OfflineConfig, RegionId};

use super::open_manager;

pub async fn run_delete_command(database: &Path, id: i64, force: bool) -> Result<()> {
    let manager = open_manager(database, OfflineConfig::default()).await?;
    let region = manager
        .region(RegionId(id))
        .await
        .with_context(|| format!("Region {id} not found"))?;
    region
        .delete(force)
        .await
        .with_context(|| format!("Failed to delete region {id}"))?;
    println!("Deleted region {id}");
    Ok(())
}
