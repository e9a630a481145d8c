//! `list` command: one line per stored region.

use std::path::Path;

use anyhow::{Context, Result};
use offline_regions::RegionStore;

use super::open_store;

pub async fn run_list_command(database: &Path) -> Result<()> {
    let store = open_store(database).await?;
    let regions = store
        .list_regions()
        .await
        .context("Failed to list regions")?;

    if regions.is_empty() {
        println!("No regions stored");
        return Ok(());
    }

    println!(
        "{:>4}  {:<8}  {:>15}  {:>12}  NAME",
        "ID", "STATE", "RESOURCES", "BYTES"
    );
    for region in regions {
        let status = store.get_status(region.id).await?;
        let name = region.metadata.region_name().unwrap_or_default();
        let count = format!(
            "{}/{}{}",
            status.completed_resource_count,
            status.required_resource_count,
            if status.is_required_count_precise { "" } else { "~" }
        );
        println!(
            "{:>4}  {:<8}  {:>15}  {:>12}  {}",
            region.id.0,
            status.download_state.as_str(),
            count,
            status.completed_resource_bytes,
            name
        );
    }
    Ok(())
}
