//! `download` command: create or resume a region and follow it to the end.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use offline_regions::{
    ChannelObserver, DownloadState, LatLngBounds, OfflineManager, OfflineRegion, RegionDefinition,
    RegionEvent, RegionId, RegionMetadata, RegionStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::open_manager;
use crate::app_config::{FileConfig, effective_offline_config};
use crate::cli::DownloadArgs;

/// How an activation ended, as seen through the observer.
#[derive(Debug)]
enum Outcome {
    Finished(RegionStatus),
    Paused(RegionStatus),
    Failed(String),
    TileLimit(u64),
}

pub async fn run_download_command(
    database: &Path,
    args: &DownloadArgs,
    file_config: Option<&FileConfig>,
    show_progress: bool,
) -> Result<()> {
    let config = effective_offline_config(args, file_config);
    debug!(?config, "effective download configuration");
    let manager = open_manager(database, config).await?;
    let region = open_region(&manager, args).await?;
    println!("Region {}", region.id());

    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    let bar = progress_bar(show_progress, &region.status());
    region.set_download_state(DownloadState::Active).await;
    let outcome = follow(&region, &mut events, &bar).await;
    region.wait_until_idle().await;
    region.set_observer(None);
    bar.finish_and_clear();

    match outcome {
        Outcome::Finished(status) | Outcome::Paused(status) if status.is_complete() => {
            info!(region_id = %region.id(), "download complete");
            println!(
                "Downloaded {} resources ({} bytes)",
                status.completed_resource_count, status.completed_resource_bytes
            );
            Ok(())
        }
        Outcome::Finished(status) | Outcome::Paused(status) => {
            println!(
                "Stopped at {}/{} resources; run `download --region {}` to resume",
                status.completed_resource_count,
                status.required_resource_count,
                region.id()
            );
            Ok(())
        }
        Outcome::Failed(message) => bail!("Download of region {} failed: {message}", region.id()),
        Outcome::TileLimit(limit) => bail!(
            "Download of region {} stopped: tile count limit of {limit} reached",
            region.id()
        ),
    }
}

async fn open_region(manager: &OfflineManager, args: &DownloadArgs) -> Result<OfflineRegion> {
    if let Some(id) = args.region {
        return manager
            .region(RegionId(id))
            .await
            .with_context(|| format!("Region {id} not found"));
    }

    let (Some(style), Some(tiles), Some([south, west, north, east])) =
        (args.style.as_deref(), args.tiles.as_deref(), args.bounds)
    else {
        bail!("--style, --tiles and --bounds are required to create a region");
    };
    let definition = RegionDefinition::new(
        style,
        tiles,
        LatLngBounds::new(south, west, north, east),
        args.min_zoom,
        args.max_zoom,
        args.pixel_ratio,
    )
    .context("Invalid region definition")?;
    let metadata = args
        .name
        .as_deref()
        .map(RegionMetadata::from_region_name)
        .transpose()
        .context("Invalid region name")?
        .unwrap_or_default();

    manager
        .create_region(definition, metadata)
        .await
        .context("Failed to create region")
}

/// Consumes observer events until the activation ends. Ctrl-C pauses it.
async fn follow(
    region: &OfflineRegion,
    events: &mut mpsc::UnboundedReceiver<RegionEvent>,
    bar: &ProgressBar,
) -> Outcome {
    let mut interrupted = false;
    let mut listen = true;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    return Outcome::Paused(region.status());
                };
                match event {
                    RegionEvent::StatusChanged(status) => {
                        update_bar(bar, &status);
                        if status.download_state == DownloadState::Inactive {
                            return if interrupted {
                                Outcome::Paused(status)
                            } else {
                                Outcome::Finished(status)
                            };
                        }
                    }
                    RegionEvent::Error { kind, message } => {
                        return Outcome::Failed(format!("{kind}: {message}"));
                    }
                    RegionEvent::TileCountLimitExceeded(limit) => return Outcome::TileLimit(limit),
                }
            }
            result = tokio::signal::ctrl_c(), if listen => {
                listen = false;
                match result {
                    Ok(()) => {
                        interrupted = true;
                        bar.set_message("pausing...");
                        region.set_download_state(DownloadState::Inactive).await;
                    }
                    Err(e) => debug!(error = %e, "cannot listen for ctrl-c"),
                }
            }
        }
    }
}

fn progress_bar(show: bool, status: &RegionStatus) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(status.required_resource_count);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    update_bar(&bar, status);
    bar
}

fn update_bar(bar: &ProgressBar, status: &RegionStatus) {
    bar.set_length(status.required_resource_count);
    bar.set_position(status.completed_resource_count);
    let estimate = if status.is_required_count_precise {
        ""
    } else {
        " (estimated)"
    };
    bar.set_message(format!(
        "resources{estimate}, {} bytes",
        status.completed_resource_bytes
    ));
}
