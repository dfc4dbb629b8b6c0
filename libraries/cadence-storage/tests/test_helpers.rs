//! Test helpers and fixtures for storage integration tests
//!
//! Databases are REAL SQLite files in a temp dir (not in-memory) so migrations, FTS5 tables,
//! constraints and indexes behave as in production.

#![allow(dead_code)]

use cadence_core::{Source, SourceId, SourceType, UpsertSong, UpsertSourcePath};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Test database wrapper that cleans up on drop
pub struct TestDb {
    pub pool: SqlitePool,
    temp_dir: TempDir,
}

impl TestDb {
    /// Create a new versioned library database in a temp dir
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let pool = cadence_storage::open_library(temp_dir.path())
            .await
            .expect("Failed to open library");

        Self { pool, temp_dir }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn data_dir(&self) -> &std::path::Path {
        self.temp_dir.path()
    }
}

/// Fixture: register a folder source for `user_id`
pub async fn create_test_source(pool: &SqlitePool, user_id: &str, root: &str) -> Source {
    let path_id = cadence_core::identity::sha256_hex(root.as_bytes());
    cadence_storage::sources::register(pool, user_id, root, &path_id, SourceType::Folder)
        .await
        .expect("Failed to register source")
}

/// Fixture: an upsert record for `relative_path` below `source`
///
/// Ids are derived from the relative path so tests can refer to them without a filesystem.
pub fn path_record(
    source: &Source,
    relative_path: &str,
    is_directory: bool,
    run_id: i64,
) -> UpsertSourcePath {
    let (parent, name) = match relative_path.rsplit_once('/') {
        Some((parent, name)) => (Some(path_id_for(source.id, parent)), name),
        None => (Some(source.path_id.clone()), relative_path),
    };

    UpsertSourcePath {
        source_id: source.id,
        path_id: path_id_for(source.id, relative_path),
        parent_path_id: parent,
        name: name.to_string(),
        relative_path: relative_path.to_string(),
        is_directory,
        run_id,
    }
}

pub fn path_id_for(source_id: SourceId, relative_path: &str) -> String {
    cadence_core::identity::sha256_hex(format!("{source_id}:{relative_path}").as_bytes())
}

/// Fixture: a song request with the key derived from its tags
pub fn song_request(artist: &str, title: &str, album: &str, path: &str) -> UpsertSong {
    UpsertSong {
        song_key: cadence_core::identity::song_key(artist, title, album),
        artist: artist.to_string(),
        title: title.to_string(),
        album: album.to_string(),
        album_artist: artist.to_string(),
        release_year: Some(1999),
        disc_number: Some(1),
        track_number: Some(1),
        cover_art_path: None,
        locator: path.as_bytes().to_vec(),
        path_hash: cadence_core::identity::sha256_hex(path.as_bytes()),
    }
}
