//! Registered source roots
//!
//! Every user owns any number of sources, of which at most one is current. Flipping the current
//! source always happens inside a single transaction so readers never observe zero or two
//! current rows.
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_storage::sources;
//! use cadence_core::SourceType;
//!
//! # async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//! let source = sources::register(pool, "user-1", "/music", "abc123", SourceType::Folder).await?;
//! let run_id = sources::next_run_id(pool, source.id).await?;
//! assert_eq!(run_id, 1);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::{now, StorageError};
use cadence_core::{Source, SourceId, SourceType};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SOURCE_COLUMNS: &str = "id, user_id, root_path, path_id, source_type, total_paths, \
     sync_error, is_current, last_run_id, created_at, last_synced_at, updated_at";

fn from_row(row: &SqliteRow) -> Result<Source> {
    let source_type: String = row.try_get("source_type")?;
    let is_current: i64 = row.try_get("is_current")?;

    Ok(Source {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        root_path: row.try_get("root_path")?,
        path_id: row.try_get("path_id")?,
        source_type: source_type.parse::<SourceType>()?,
        total_paths: row.try_get("total_paths")?,
        sync_error: row.try_get("sync_error")?,
        is_current: is_current != 0,
        last_run_id: row.try_get("last_run_id")?,
        created_at: row.try_get("created_at")?,
        last_synced_at: row.try_get("last_synced_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Register a root for a user and make it the current source.
///
/// Registering an already known root refreshes its path and type instead of creating a
/// duplicate. The previous current source (if any) is cleared in the same transaction.
pub async fn register(
    pool: &SqlitePool,
    user_id: &str,
    root_path: &str,
    path_id: &str,
    source_type: SourceType,
) -> Result<Source> {
    let timestamp = now();
    let mut tx = pool.begin().await?;

    let id: SourceId = sqlx::query_scalar(
        "INSERT INTO sources (user_id, root_path, path_id, source_type, is_current, created_at, updated_at)
         VALUES (?, ?, ?, ?, 0, ?, ?)
         ON CONFLICT (user_id, path_id) DO UPDATE SET
             root_path = excluded.root_path,
             source_type = excluded.source_type,
             updated_at = excluded.updated_at
         RETURNING id",
    )
    .bind(user_id)
    .bind(root_path)
    .bind(path_id)
    .bind(source_type.as_str())
    .bind(timestamp)
    .bind(timestamp)
    .fetch_one(&mut *tx)
    .await?;

    flip_current(&mut tx, user_id, id, timestamp).await?;
    tx.commit().await?;

    tracing::info!("Registered source {} ({}) for user {}", id, root_path, user_id);

    get_by_id(pool, id)
        .await?
        .ok_or_else(|| StorageError::not_found("Source", id.to_string()))
}

async fn flip_current(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
    id: SourceId,
    timestamp: i64,
) -> Result<()> {
    sqlx::query(
        "UPDATE sources SET is_current = 0, updated_at = ?
         WHERE user_id = ? AND is_current = 1 AND id != ?",
    )
    .bind(timestamp)
    .bind(user_id)
    .bind(id)
    .execute(&mut **tx)
    .await?;

    let result = sqlx::query(
        "UPDATE sources SET is_current = 1, updated_at = ? WHERE id = ? AND user_id = ?",
    )
    .bind(timestamp)
    .bind(id)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Source", id.to_string()));
    }
    Ok(())
}

/// Get a source by ID
pub async fn get_by_id(pool: &SqlitePool, id: SourceId) -> Result<Option<Source>> {
    let row = sqlx::query(&format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

/// Get the user's current source
pub async fn get_current(pool: &SqlitePool, user_id: &str) -> Result<Option<Source>> {
    let row = sqlx::query(&format!(
        "SELECT {SOURCE_COLUMNS} FROM sources WHERE user_id = ? AND is_current = 1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// All sources of a user, oldest registration first
pub async fn get_by_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<Source>> {
    let rows = sqlx::query(&format!(
        "SELECT {SOURCE_COLUMNS} FROM sources WHERE user_id = ? ORDER BY created_at, id"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Make `id` the user's only current source
pub async fn set_current(pool: &SqlitePool, user_id: &str, id: SourceId) -> Result<()> {
    let mut tx = pool.begin().await?;
    flip_current(&mut tx, user_id, id, now()).await?;
    tx.commit().await?;
    Ok(())
}

/// Issue the next scan generation for a source and persist it
pub async fn next_run_id(pool: &SqlitePool, id: SourceId) -> Result<i64> {
    let run_id: Option<i64> = sqlx::query_scalar(
        "UPDATE sources SET last_run_id = last_run_id + 1, updated_at = ?
         WHERE id = ?
         RETURNING last_run_id",
    )
    .bind(now())
    .bind(id)
    .fetch_optional(pool)
    .await?;

    run_id.ok_or_else(|| StorageError::not_found("Source", id.to_string()))
}

/// Record a successful sync: entry count, sync time, and a cleared error
pub async fn record_sync(pool: &SqlitePool, id: SourceId, total_paths: i64) -> Result<()> {
    let timestamp = now();
    sqlx::query(
        "UPDATE sources
         SET total_paths = ?, sync_error = NULL, last_synced_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(total_paths)
    .bind(timestamp)
    .bind(timestamp)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Set or clear the error shown for the source's last sync or import
pub async fn set_sync_error(pool: &SqlitePool, id: SourceId, error: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE sources SET sync_error = ?, updated_at = ? WHERE id = ?")
        .bind(error)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Number of sources, across all users, registered on the root `path_id`
pub async fn count_by_path_id(pool: &SqlitePool, path_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE path_id = ?")
        .bind(path_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Delete a source together with its paths and their search rows
pub async fn delete(pool: &SqlitePool, id: SourceId) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM source_paths_fts
         WHERE rowid IN (SELECT id FROM source_paths WHERE source_id = ?)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query("DELETE FROM sources WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Source", id.to_string()));
    }

    tx.commit().await?;
    Ok(())
}
