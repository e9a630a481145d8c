//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Download map regions for offline use.
///
/// Regions are stored in a SQLite database; an interrupted download resumes
/// where it stopped the next time it is started.
#[derive(Parser, Debug)]
#[command(name = "offline-regions")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Region database path (default: offline-regions.db)
    #[arg(short = 'd', long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a region and download it, or resume an existing one
    Download(DownloadArgs),
    /// List stored regions
    List,
    /// Show one region's progress
    Status {
        /// Region id
        id: i64,
    },
    /// Delete a region and everything stored for it
    Delete {
        /// Region id
        id: i64,

        /// Cancel a running download first instead of refusing
        #[arg(long)]
        force: bool,
    },
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Resume the region with this id instead of creating one
    #[arg(long, conflicts_with_all = ["style", "tiles", "bounds", "name"])]
    pub region: Option<i64>,

    /// Style document URL
    #[arg(long, required_unless_present = "region")]
    pub style: Option<String>,

    /// Tile URL template with {z}, {x}, {y} and optional {ratio}
    #[arg(long, required_unless_present = "region")]
    pub tiles: Option<String>,

    /// Bounding box as south,west,north,east
    #[arg(long, value_parser = parse_bounds, allow_hyphen_values = true, required_unless_present = "region")]
    pub bounds: Option<[f64; 4]>,

    /// Lowest zoom level
    #[arg(long, default_value_t = 0.0)]
    pub min_zoom: f64,

    /// Highest zoom level
    #[arg(long, default_value_t = 14.0)]
    pub max_zoom: f64,

    /// Device pixel ratio; above 1 selects @2x assets
    #[arg(long, default_value_t = 1.0)]
    pub pixel_ratio: f32,

    /// Region name stored in the metadata
    #[arg(long)]
    pub name: Option<String>,

    /// Maximum concurrent fetches (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Maximum attempts per resource (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_retries: Option<u8>,

    /// Per-request timeout in seconds (1-3600)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Ceiling on stored tiles across all regions
    #[arg(long)]
    pub tile_limit: Option<u64>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

fn parse_bounds(raw: &str) -> Result<[f64; 4], String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [south, west, north, east] = parts.as_slice() else {
        return Err(format!(
            "expected south,west,north,east but got {} values",
            parts.len()
        ));
    };
    let mut bounds = [0.0; 4];
    for (slot, part) in bounds.iter_mut().zip([south, west, north, east]) {
        *slot = part
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate '{part}': {e}"))?;
    }
    Ok(bounds)
}
