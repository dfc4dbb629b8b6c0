//! Cadence Storage
//!
//! `SQLite` database layer for registered sources, their path snapshots and imported songs.
//!
//! # Architecture
//!
//! - **Vertical Slicing**: each table owns its module (`sources`, `source_paths`, `songs`)
//! - **Shadow Indexes**: `source_paths` and `songs` keep an FTS5 twin that is written in the
//!   same transaction as the row it mirrors
//! - **Full-Reset Versioning**: every schema version lives in its own database file; opening a
//!   library discards files written by other versions instead of altering them in place
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_storage::{open_library, sources};
//! use cadence_core::SourceType;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = open_library(std::path::Path::new("./data")).await?;
//!
//! let source = sources::register(&pool, "user-1", "/music", "path-id", SourceType::Folder).await?;
//! assert!(source.is_current);
//! # Ok(())
//! # }
//! ```

mod error;
mod fts;

pub mod pagination;
pub mod songs;
pub mod source_paths;
pub mod sources;

pub use error::StorageError;
pub use pagination::{Page, PageRequest};

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePool;
use std::path::{Path, PathBuf};

/// Bump whenever the schema changes; the next launch starts from an empty database file.
pub const SCHEMA_VERSION: u32 = 1;

const DATABASE_PREFIX: &str = "cadence-v";
const DATABASE_EXTENSION: &str = "sqlite";

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// # Errors
///
/// Returns an error if migrations fail to run
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

/// Path of the database file for the current schema version inside `data_dir`
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(format!(
        "{DATABASE_PREFIX}{SCHEMA_VERSION}.{DATABASE_EXTENSION}"
    ))
}

/// Open (or create) the library database for the current schema version.
///
/// Database files left behind by other schema versions are deleted first, together with
/// their WAL and shared-memory companions.
pub async fn open_library(data_dir: &Path) -> Result<SqlitePool, StorageError> {
    tokio::fs::create_dir_all(data_dir).await?;
    purge_other_versions(data_dir).await?;

    let path = database_path(data_dir);
    let url = format!("sqlite://{}", path.display());
    let pool = create_pool(&url).await?;
    run_migrations(&pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    tracing::info!("Opened library database {}", path.display());
    Ok(pool)
}

async fn purge_other_versions(data_dir: &Path) -> Result<(), StorageError> {
    let current = database_path(data_dir);
    let current_name = current
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut entries = tokio::fs::read_dir(data_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(DATABASE_PREFIX) || name.starts_with(&current_name) {
            continue;
        }
        tracing::info!("Removing database from another schema version: {}", name);
        tokio::fs::remove_file(entry.path()).await?;
    }
    Ok(())
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `<sqlite://cadence.sqlite>`)
///
/// # Errors
///
/// Returns an error if the connection fails
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    tracing::debug!("Creating pool with URL: {}", database_url);

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

pub(crate) fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
