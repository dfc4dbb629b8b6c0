//! Path index: the latest filesystem snapshot of every source
//!
//! Rows are keyed by `(source_id, path_id)` and tagged with the scan generation that last saw
//! them. A sync upserts everything it found under a fresh run id and then prunes rows carrying an
//! older one. The `source_paths_fts` shadow table is written in the same transaction as the rows
//! it mirrors and shares their rowid.

use crate::error::Result;
use crate::{fts, now};
use cadence_core::{PathSearchResult, RunId, SourceId, SourcePath, UpsertSourcePath};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;

const PATH_COLUMNS: &str = "id, source_id, path_id, parent_path_id, name, relative_path, \
     is_directory, file_hash_sha256, run_id, created_at, updated_at";

/// Outcome of a [`batch_upsert`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: u64,
    pub updated: u64,
}

fn from_row(row: &SqliteRow) -> Result<SourcePath> {
    let is_directory: i64 = row.try_get("is_directory")?;

    Ok(SourcePath {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        path_id: row.try_get("path_id")?,
        parent_path_id: row.try_get("parent_path_id")?,
        name: row.try_get("name")?,
        relative_path: row.try_get("relative_path")?,
        is_directory: is_directory != 0,
        file_hash_sha256: row.try_get("file_hash_sha256")?,
        run_id: row.try_get("run_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert or update a batch of entries in one transaction.
///
/// Existing rows are updated in place, keeping their recorded content hash.
pub async fn batch_upsert(pool: &SqlitePool, records: &[UpsertSourcePath]) -> Result<UpsertStats> {
    let mut stats = UpsertStats::default();
    if records.is_empty() {
        return Ok(stats);
    }

    let timestamp = now();
    let mut tx = pool.begin().await?;

    for record in records {
        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM source_paths WHERE source_id = ? AND path_id = ?")
                .bind(record.source_id)
                .bind(&record.path_id)
                .fetch_optional(&mut *tx)
                .await?;

        let id = if let Some(id) = existing {
            sqlx::query(
                "UPDATE source_paths
                 SET parent_path_id = ?, name = ?, relative_path = ?, is_directory = ?,
                     run_id = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&record.parent_path_id)
            .bind(&record.name)
            .bind(&record.relative_path)
            .bind(record.is_directory)
            .bind(record.run_id)
            .bind(timestamp)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            stats.updated += 1;
            id
        } else {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO source_paths
                     (source_id, path_id, parent_path_id, name, relative_path, is_directory,
                      run_id, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(record.source_id)
            .bind(&record.path_id)
            .bind(&record.parent_path_id)
            .bind(&record.name)
            .bind(&record.relative_path)
            .bind(record.is_directory)
            .bind(record.run_id)
            .bind(timestamp)
            .bind(timestamp)
            .fetch_one(&mut *tx)
            .await?;
            stats.inserted += 1;
            id
        };

        write_fts_row(&mut tx, id, record).await?;
    }

    tx.commit().await?;

    tracing::debug!(
        "Upserted {} path(s): {} inserted, {} updated",
        records.len(),
        stats.inserted,
        stats.updated
    );
    Ok(stats)
}

async fn write_fts_row(
    conn: &mut SqliteConnection,
    id: i64,
    record: &UpsertSourcePath,
) -> Result<()> {
    sqlx::query("DELETE FROM source_paths_fts WHERE rowid = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO source_paths_fts (rowid, path_id, source_id, run_id, full_path, file_name)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&record.path_id)
    .bind(record.source_id)
    .bind(record.run_id)
    .bind(&record.relative_path)
    .bind(&record.name)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Delete every row of the source not seen by scan generation `current_run_id`.
///
/// Returns the number of removed rows.
pub async fn prune_stale(
    pool: &SqlitePool,
    source_id: SourceId,
    current_run_id: RunId,
) -> Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM source_paths_fts
         WHERE rowid IN (SELECT id FROM source_paths WHERE source_id = ? AND run_id != ?)",
    )
    .bind(source_id)
    .bind(current_run_id)
    .execute(&mut *tx)
    .await?;

    let removed = sqlx::query("DELETE FROM source_paths WHERE source_id = ? AND run_id != ?")
        .bind(source_id)
        .bind(current_run_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    if removed > 0 {
        tracing::info!(
            "Pruned {} stale path(s) from source {} (run {})",
            removed,
            source_id,
            current_run_id
        );
    }
    Ok(removed)
}

/// Point lookup by path hash
pub async fn get_by_path_id(
    pool: &SqlitePool,
    source_id: SourceId,
    path_id: &str,
) -> Result<Option<SourcePath>> {
    let row = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM source_paths WHERE source_id = ? AND path_id = ?"
    ))
    .bind(source_id)
    .bind(path_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// Point lookup by path relative to the source root
pub async fn get_by_path(
    pool: &SqlitePool,
    source_id: SourceId,
    relative_path: &str,
) -> Result<Option<SourcePath>> {
    let row = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM source_paths WHERE source_id = ? AND relative_path = ?"
    ))
    .bind(source_id)
    .bind(relative_path)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// One directory level: the direct children of `parent_path_id`, directories first
pub async fn get_by_parent_id(
    pool: &SqlitePool,
    source_id: SourceId,
    parent_path_id: &str,
) -> Result<Vec<SourcePath>> {
    let rows = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM source_paths
         WHERE source_id = ? AND parent_path_id = ?
         ORDER BY is_directory DESC, name COLLATE NOCASE"
    ))
    .bind(source_id)
    .bind(parent_path_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Every file below the directory `path_id`, at any depth.
///
/// A file's own `path_id` yields just that file.
pub async fn get_descendant_files(
    pool: &SqlitePool,
    source_id: SourceId,
    path_id: &str,
) -> Result<Vec<SourcePath>> {
    let rows = sqlx::query(&format!(
        "WITH RECURSIVE tree(path_id) AS (
             SELECT path_id FROM source_paths WHERE source_id = ? AND path_id = ?
             UNION
             SELECT p.path_id FROM source_paths p
             JOIN tree t ON p.parent_path_id = t.path_id
             WHERE p.source_id = ?
         )
         SELECT {PATH_COLUMNS} FROM source_paths
         WHERE source_id = ? AND is_directory = 0 AND path_id IN (SELECT path_id FROM tree)
         ORDER BY relative_path"
    ))
    .bind(source_id)
    .bind(path_id)
    .bind(source_id)
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Every indexed entry of a source, ordered by relative path
pub async fn list_by_source(pool: &SqlitePool, source_id: SourceId) -> Result<Vec<SourcePath>> {
    let rows = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM source_paths WHERE source_id = ? ORDER BY relative_path"
    ))
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

pub async fn count_by_source(pool: &SqlitePool, source_id: SourceId) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_paths WHERE source_id = ?")
        .bind(source_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Files of a source that have no recorded content hash yet
pub async fn pending_hash(pool: &SqlitePool, source_id: SourceId) -> Result<Vec<SourcePath>> {
    let rows = sqlx::query(&format!(
        "SELECT {PATH_COLUMNS} FROM source_paths
         WHERE source_id = ? AND is_directory = 0 AND file_hash_sha256 IS NULL
         ORDER BY relative_path"
    ))
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Record the content hash of an imported file
pub async fn set_file_hash(
    pool: &SqlitePool,
    source_id: SourceId,
    path_id: &str,
    hash: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE source_paths SET file_hash_sha256 = ?, updated_at = ?
         WHERE source_id = ? AND path_id = ?",
    )
    .bind(hash)
    .bind(now())
    .bind(source_id)
    .bind(path_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Full-text search over names and relative paths of one source.
///
/// Results are ordered by relevance; an empty or all-punctuation query matches nothing.
pub async fn search(
    pool: &SqlitePool,
    source_id: SourceId,
    query: &str,
    limit: u32,
) -> Result<Vec<PathSearchResult>> {
    let Some(expression) = fts::match_expression(query) else {
        return Ok(Vec::new());
    };

    let rows = sqlx::query(
        "SELECT path_id, rank FROM source_paths_fts
         WHERE source_paths_fts MATCH ? AND source_id = ?
         ORDER BY rank
         LIMIT ?",
    )
    .bind(expression)
    .bind(source_id)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(PathSearchResult {
                path_id: row.try_get("path_id")?,
                rank: row.try_get("rank")?,
            })
        })
        .collect()
}

/// Hydrate search hits, keeping the order of `path_ids`; unknown ids are dropped
pub async fn get_by_path_ids(
    pool: &SqlitePool,
    source_id: SourceId,
    path_ids: &[String],
) -> Result<Vec<SourcePath>> {
    if path_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {PATH_COLUMNS} FROM source_paths WHERE source_id = "
    ));
    builder.push_bind(source_id);
    builder.push(" AND path_id IN (");
    let mut separated = builder.separated(", ");
    for path_id in path_ids {
        separated.push_bind(path_id.clone());
    }
    separated.push_unseparated(")");

    let rows = builder.build().fetch_all(pool).await?;

    let mut by_id: HashMap<String, SourcePath> = rows
        .iter()
        .map(|row| from_row(row).map(|path| (path.path_id.clone(), path)))
        .collect::<Result<_>>()?;

    Ok(path_ids.iter().filter_map(|id| by_id.remove(id)).collect())
}
