//! SQLite-backed [`RegionStore`].

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};

use super::{RegionId, RegionStore, StoreError, StoredRegion};
use crate::db::Database;
use crate::region::{
    DownloadState, LatLngBounds, RegionDefinition, RegionMetadata, RegionStatus, ResourceKey,
    ResourceKind,
};

/// Region store persisting to the `regions` and `region_resources` tables.
#[derive(Debug, Clone)]
pub struct SqliteRegionStore {
    db: Database,
}

impl SqliteRegionStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }
}

fn to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn check_affected(id: RegionId, rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::RegionNotFound { id });
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn definition_from_row(id: RegionId, row: &SqliteRow) -> Result<RegionDefinition, StoreError> {
    let bounds = LatLngBounds::new(
        row.try_get("south")?,
        row.try_get("west")?,
        row.try_get("north")?,
        row.try_get("east")?,
    );
    let pixel_ratio: f64 = row.try_get("pixel_ratio")?;
    RegionDefinition::new(
        row.try_get::<String, _>("style_url")?,
        row.try_get::<String, _>("tile_url_template")?,
        bounds,
        row.try_get("min_zoom")?,
        row.try_get("max_zoom")?,
        pixel_ratio as f32,
    )
    .map_err(|e| StoreError::invalid_definition(id, &e))
}

fn status_from_row(row: &SqliteRow) -> Result<RegionStatus, StoreError> {
    Ok(RegionStatus {
        download_state: DownloadState::parse(row.try_get::<&str, _>("download_state")?),
        required_resource_count: from_db(row.try_get("required_resource_count")?),
        completed_resource_count: from_db(row.try_get("completed_resource_count")?),
        completed_resource_bytes: from_db(row.try_get("completed_resource_bytes")?),
        is_required_count_precise: row.try_get("is_required_count_precise")?,
    })
}

#[async_trait]
impl RegionStore for SqliteRegionStore {
    #[instrument(level = "debug", skip_all)]
    async fn allocate_region(
        &self,
        definition: &RegionDefinition,
        metadata: &RegionMetadata,
    ) -> Result<RegionId, StoreError> {
        let bounds = definition.bounds();
        let row = sqlx::query(
            r"INSERT INTO regions (
                style_url, tile_url_template, south, west, north, east,
                min_zoom, max_zoom, pixel_ratio, metadata
              )
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(definition.style_url())
        .bind(definition.tile_url_template())
        .bind(bounds.south)
        .bind(bounds.west)
        .bind(bounds.north)
        .bind(bounds.east)
        .bind(definition.min_zoom())
        .bind(definition.max_zoom())
        .bind(f64::from(definition.pixel_ratio()))
        .bind(metadata.as_bytes())
        .fetch_one(self.db.pool())
        .await?;

        let id = RegionId(row.try_get("id")?);
        debug!(%id, "region allocated");
        Ok(id)
    }

    #[instrument(level = "trace", skip(self, key, data), fields(key = %key, bytes = data.len()))]
    async fn put_resource(
        &self,
        id: RegionId,
        key: &ResourceKey,
        data: &[u8],
    ) -> Result<bool, StoreError> {
        let mut tx = self.db.pool().begin().await?;

        // Write first: upgrading a read transaction fails with SQLITE_BUSY.
        let touched = sqlx::query("UPDATE regions SET updated_at = datetime('now') WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        check_affected(id, touched)?;

        let inserted = sqlx::query(
            r"INSERT OR IGNORE INTO region_resources (region_id, url, kind, data)
              VALUES (?, ?, ?, ?)",
        )
        .bind(id.0)
        .bind(key.url())
        .bind(key.kind().as_str())
        .bind(data)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            return Ok(false);
        }

        sqlx::query(
            r"UPDATE regions
              SET completed_resource_count = completed_resource_count + 1,
                  completed_resource_bytes = completed_resource_bytes + ?
              WHERE id = ?",
        )
        .bind(to_db(data.len() as u64))
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn has_resource(&self, id: RegionId, key: &ResourceKey) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM region_resources WHERE region_id = ? AND url = ?")
            .bind(id.0)
            .bind(key.url())
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.is_some())
    }

    async fn get_resource(
        &self,
        id: RegionId,
        key: &ResourceKey,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let row = sqlx::query("SELECT data FROM region_resources WHERE region_id = ? AND url = ?")
            .bind(id.0)
            .bind(key.url())
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|row| row.try_get("data"))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn get_status(&self, id: RegionId) -> Result<RegionStatus, StoreError> {
        let row = sqlx::query(
            r"SELECT download_state, required_resource_count, completed_resource_count,
                     completed_resource_bytes, is_required_count_precise
              FROM regions WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or(StoreError::RegionNotFound { id })?;
        status_from_row(&row)
    }

    #[instrument(level = "debug", skip(self))]
    async fn set_download_state(
        &self,
        id: RegionId,
        state: DownloadState,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE regions SET download_state = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(id.0)
        .execute(self.db.pool())
        .await?;
        check_affected(id, result.rows_affected())
    }

    async fn set_required_count(
        &self,
        id: RegionId,
        count: u64,
        precise: bool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"UPDATE regions
              SET required_resource_count = ?, is_required_count_precise = ?,
                  updated_at = datetime('now')
              WHERE id = ?",
        )
        .bind(to_db(count))
        .bind(precise)
        .bind(id.0)
        .execute(self.db.pool())
        .await?;
        check_affected(id, result.rows_affected())
    }

    async fn update_metadata(
        &self,
        id: RegionId,
        metadata: &RegionMetadata,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE regions SET metadata = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(metadata.as_bytes())
        .bind(id.0)
        .execute(self.db.pool())
        .await?;
        check_affected(id, result.rows_affected())
    }

    async fn list_regions(&self) -> Result<Vec<StoredRegion>, StoreError> {
        let rows = sqlx::query(
            r"SELECT id, style_url, tile_url_template, south, west, north, east,
                     min_zoom, max_zoom, pixel_ratio, metadata
              FROM regions ORDER BY id",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| -> Result<StoredRegion, StoreError> {
                let id = RegionId(row.try_get("id")?);
                Ok(StoredRegion {
                    id,
                    definition: definition_from_row(id, row)?,
                    metadata: RegionMetadata::new(row.try_get("metadata")?),
                })
            })
            .collect()
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_region(&self, id: RegionId) -> Result<u64, StoreError> {
        let mut tx = self.db.pool().begin().await?;

        let touched = sqlx::query("UPDATE regions SET updated_at = datetime('now') WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        check_affected(id, touched)?;

        let state: Option<String> =
            sqlx::query_scalar("SELECT download_state FROM regions WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        match state.as_deref().map(DownloadState::parse) {
            None => return Err(StoreError::RegionNotFound { id }),
            Some(DownloadState::Active) => return Err(StoreError::RegionActive { id }),
            Some(DownloadState::Inactive) => {}
        }

        let tiles: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM region_resources WHERE region_id = ? AND kind = ?",
        )
        .bind(id.0)
        .bind(ResourceKind::Tile.as_str())
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM region_resources WHERE region_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM regions WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(%id, tiles, "region deleted");
        Ok(from_db(tiles))
    }

    async fn tile_count(&self) -> Result<u64, StoreError> {
        let tiles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM region_resources WHERE kind = ?")
            .bind(ResourceKind::Tile.as_str())
            .fetch_one(self.db.pool())
            .await?;
        Ok(from_db(tiles))
    }
}
