//! CLI entry point for the offline region downloader.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, warn};

mod app_config;
mod cli;
mod commands;

use app_config::{effective_database, load_default_file_config};
use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_default_file_config()?;
    match (&loaded.path, &loaded.config) {
        (Some(path), Some(_)) => debug!(path = %path.display(), "loaded config file"),
        (Some(path), None) => debug!(path = %path.display(), "no config file, using defaults"),
        (None, _) => warn!("cannot resolve config directory, using defaults"),
    }
    let file_config = loaded.config.as_ref();
    let database = effective_database(args.database.as_deref(), file_config);

    match &args.command {
        Command::Download(download) => {
            let show_progress = !args.quiet && !download.no_progress;
            commands::run_download_command(&database, download, file_config, show_progress).await
        }
        Command::List => commands::run_list_command(&database).await,
        Command::Status { id } => commands::run_status_command(&database, *id).await,
        Command::Delete { id, force } => {
            commands::run_delete_command(&database, *id, *force).await
        }
    }
}
