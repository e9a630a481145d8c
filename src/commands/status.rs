//! `status` command: one region's definition and progress as `key = value` lines.

use std::path::Path;

use anyhow::{Result, bail};
use offline_regions::{RegionId, RegionStore};

use super::open_store;

pub async fn run_status_command(database: &Path, id: i64) -> Result<()> {
    let store = open_store(database).await?;
    let id = RegionId(id);
    let Some(region) = store
        .list_regions()
        .await?
        .into_iter()
        .find(|region| region.id == id)
    else {
        bail!("Region {id} not found");
    };
    let status = store.get_status(id).await?;
    let definition = &region.definition;
    let bounds = definition.bounds();

    println!("id = {id}");
    if let Some(name) = region.metadata.region_name() {
        println!("name = {name}");
    }
    println!("state = {}", status.download_state);
    println!("style_url = {}", definition.style_url());
    println!("tile_url_template = {}", definition.tile_url_template());
    println!(
        "bounds = {},{},{},{}",
        bounds.south, bounds.west, bounds.north, bounds.east
    );
    println!(
        "zoom = {}..{}",
        definition.min_zoom(),
        definition.max_zoom()
    );
    println!("pixel_ratio = {}", definition.pixel_ratio());
    println!(
        "required = {}{}",
        status.required_resource_count,
        if status.is_required_count_precise {
            ""
        } else {
            " (estimate)"
        }
    );
    println!("completed = {}", status.completed_resource_count);
    println!("bytes = {}", status.completed_resource_bytes);
    println!("complete = {}", status.is_complete());
    println!("percentage = {:.1}", status.percentage());
    Ok(())
}
