//! CLI command handlers.

mod delete;
mod download;
mod list;
mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use offline_regions::{
    Database, HttpTransport, OfflineConfig, OfflineManager, ResourceFetcher, RetryPolicy,
    SqliteRegionStore, connectivity,
};
use tracing::debug;

pub use delete::run_delete_command;
pub use download::run_download_command;
pub use list::run_list_command;
pub use status::run_status_command;

async fn open_store(database: &Path) -> Result<Arc<SqliteRegionStore>> {
    debug!(path = %database.display(), "opening region database");
    let db = Database::new(database)
        .await
        .with_context(|| format!("Failed to open region database '{}'", database.display()))?;
    Ok(Arc::new(SqliteRegionStore::new(db)))
}

async fn open_manager(database: &Path, config: OfflineConfig) -> Result<OfflineManager> {
    let store = open_store(database).await?;
    let transport = HttpTransport::new().context("Failed to build HTTP client")?;
    let fetcher = ResourceFetcher::new(Arc::new(transport), RetryPolicy::default());
    let manager = OfflineManager::open(store, fetcher, config, connectivity::global())
        .await
        .context("Failed to open offline manager")?;
    Ok(manager)
}
