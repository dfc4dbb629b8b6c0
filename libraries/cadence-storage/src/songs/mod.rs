//! Imported songs
//!
//! `song_key` is the upsert identity: importing a file whose normalized (artist, title, album)
//! matches an existing song refreshes that row instead of adding one. The `songs_fts` shadow
//! table shares the song rowid and is rewritten with every upsert.
//!
//! The copy columns (`file_state`, `copy_attempts`, `next_copy_at`, `local_file_path`) are owned
//! by the background copy service.

use crate::error::Result;
use crate::pagination::{Page, PageRequest};
use crate::{fts, now, StorageError};
use cadence_core::{FileState, Song, SongId, UpsertSong};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

const SONG_COLUMNS: &str = "s.id, s.song_key, s.artist, s.title, s.album, s.album_artist, \
     s.release_year, s.disc_number, s.track_number, s.cover_art_path, s.locator, s.path_hash, \
     s.local_file_path, s.file_state, s.copy_attempts, s.next_copy_at, s.created_at, s.updated_at";

fn from_row(row: &SqliteRow) -> Result<Song> {
    let file_state: String = row.try_get("file_state")?;

    Ok(Song {
        id: row.try_get("id")?,
        song_key: row.try_get("song_key")?,
        artist: row.try_get("artist")?,
        title: row.try_get("title")?,
        album: row.try_get("album")?,
        album_artist: row.try_get("album_artist")?,
        release_year: row.try_get("release_year")?,
        disc_number: row.try_get("disc_number")?,
        track_number: row.try_get("track_number")?,
        cover_art_path: row.try_get("cover_art_path")?,
        locator: row.try_get("locator")?,
        path_hash: row.try_get("path_hash")?,
        local_file_path: row.try_get("local_file_path")?,
        file_state: file_state.parse::<FileState>()?,
        copy_attempts: row.try_get("copy_attempts")?,
        next_copy_at: row.try_get("next_copy_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a song or refresh the one sharing its `song_key`.
///
/// The result is always `bookmark_only` with a clean retry budget, so a re-import queues the
/// file for copying again. A missing cover never erases one recorded earlier.
pub async fn upsert(pool: &SqlitePool, song: &UpsertSong) -> Result<Song> {
    let timestamp = now();
    let mut tx = pool.begin().await?;

    let id: SongId = sqlx::query_scalar(
        "INSERT INTO songs
             (song_key, artist, title, album, album_artist, release_year, disc_number,
              track_number, cover_art_path, locator, path_hash, file_state, copy_attempts,
              created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'bookmark_only', 0, ?, ?)
         ON CONFLICT (song_key) DO UPDATE SET
             artist = excluded.artist,
             title = excluded.title,
             album = excluded.album,
             album_artist = excluded.album_artist,
             release_year = excluded.release_year,
             disc_number = excluded.disc_number,
             track_number = excluded.track_number,
             cover_art_path = COALESCE(excluded.cover_art_path, songs.cover_art_path),
             locator = excluded.locator,
             path_hash = excluded.path_hash,
             local_file_path = NULL,
             file_state = 'bookmark_only',
             copy_attempts = 0,
             next_copy_at = NULL,
             updated_at = excluded.updated_at
         RETURNING id",
    )
    .bind(&song.song_key)
    .bind(&song.artist)
    .bind(&song.title)
    .bind(&song.album)
    .bind(&song.album_artist)
    .bind(song.release_year)
    .bind(song.disc_number)
    .bind(song.track_number)
    .bind(&song.cover_art_path)
    .bind(&song.locator)
    .bind(&song.path_hash)
    .bind(timestamp)
    .bind(timestamp)
    .fetch_one(&mut *tx)
    .await?;

    write_fts_row(&mut tx, id, song).await?;
    tx.commit().await?;

    tracing::debug!("Upserted song {} '{}' by '{}'", id, song.title, song.artist);

    get_by_id(pool, id)
        .await?
        .ok_or_else(|| StorageError::not_found("Song", id.to_string()))
}

async fn write_fts_row(conn: &mut SqliteConnection, id: SongId, song: &UpsertSong) -> Result<()> {
    sqlx::query("DELETE FROM songs_fts WHERE rowid = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        "INSERT INTO songs_fts (rowid, song_id, title, artist, album, album_artist)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(id)
    .bind(&song.title)
    .bind(&song.artist)
    .bind(&song.album)
    .bind(&song.album_artist)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_by_id(pool: &SqlitePool, id: SongId) -> Result<Option<Song>> {
    let row = sqlx::query(&format!("SELECT {SONG_COLUMNS} FROM songs s WHERE s.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

pub async fn get_by_song_key(pool: &SqlitePool, song_key: &str) -> Result<Option<Song>> {
    let row = sqlx::query(&format!(
        "SELECT {SONG_COLUMNS} FROM songs s WHERE s.song_key = ?"
    ))
    .bind(song_key)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

/// Most recently updated song imported from the file whose absolute path hashes to `path_hash`
pub async fn get_by_path_hash(pool: &SqlitePool, path_hash: &str) -> Result<Option<Song>> {
    let row = sqlx::query(&format!(
        "SELECT {SONG_COLUMNS} FROM songs s
         WHERE s.path_hash = ?
         ORDER BY s.updated_at DESC, s.id DESC
         LIMIT 1"
    ))
    .bind(path_hash)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(from_row).transpose()
}

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// All songs ordered by artist, album and track
pub async fn list(pool: &SqlitePool, request: PageRequest) -> Result<Page<Song>> {
    let rows = sqlx::query(&format!(
        "SELECT {SONG_COLUMNS} FROM songs s
         ORDER BY s.artist COLLATE NOCASE, s.album COLLATE NOCASE,
                  s.disc_number, s.track_number, s.title COLLATE NOCASE
         LIMIT ? OFFSET ?"
    ))
    .bind(request.limit())
    .bind(request.offset())
    .fetch_all(pool)
    .await?;

    let items = rows.iter().map(from_row).collect::<Result<Vec<_>>>()?;
    let total = count(pool).await?;

    Ok(Page::new(items, u64::try_from(total).unwrap_or(0), request))
}

/// Full-text search over title, artist, album and album artist, best match first
pub async fn search(pool: &SqlitePool, query: &str, request: PageRequest) -> Result<Page<Song>> {
    let Some(expression) = fts::match_expression(query) else {
        return Ok(Page::new(Vec::new(), 0, request));
    };

    let rows = sqlx::query(&format!(
        "SELECT {SONG_COLUMNS} FROM songs_fts
         JOIN songs s ON s.id = songs_fts.rowid
         WHERE songs_fts MATCH ?
         ORDER BY songs_fts.rank
         LIMIT ? OFFSET ?"
    ))
    .bind(&expression)
    .bind(request.limit())
    .bind(request.offset())
    .fetch_all(pool)
    .await?;

    let items = rows.iter().map(from_row).collect::<Result<Vec<_>>>()?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs_fts WHERE songs_fts MATCH ?")
        .bind(&expression)
        .fetch_one(pool)
        .await?;

    Ok(Page::new(items, u64::try_from(total).unwrap_or(0), request))
}

/// Replace the locator after it was renewed at playback time
pub async fn update_locator(pool: &SqlitePool, id: SongId, locator: &[u8]) -> Result<()> {
    let result = sqlx::query("UPDATE songs SET locator = ?, updated_at = ? WHERE id = ?")
        .bind(locator)
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found("Song", id.to_string()));
    }
    Ok(())
}

/// Songs the copy service should process now.
///
/// That is every `bookmark_only` song plus failed songs that still have attempts left and whose
/// backoff has elapsed at `now`.
pub async fn pending_copies(pool: &SqlitePool, now: i64, max_attempts: u32) -> Result<Vec<Song>> {
    let rows = sqlx::query(&format!(
        "SELECT {SONG_COLUMNS} FROM songs s
         WHERE s.file_state = 'bookmark_only'
            OR (s.file_state = 'failed'
                AND s.copy_attempts < ?
                AND (s.next_copy_at IS NULL OR s.next_copy_at <= ?))
         ORDER BY s.id"
    ))
    .bind(i64::from(max_attempts))
    .bind(now)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

pub async fn mark_copy_pending(pool: &SqlitePool, id: SongId) -> Result<()> {
    set_state(pool, id, FileState::CopyPending).await
}

/// Record a finished copy at `local_file_path`
pub async fn mark_copied(pool: &SqlitePool, id: SongId, local_file_path: &str) -> Result<()> {
    sqlx::query(
        "UPDATE songs
         SET file_state = 'copied', local_file_path = ?, next_copy_at = NULL, updated_at = ?
         WHERE id = ?",
    )
    .bind(local_file_path)
    .bind(now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a failed copy attempt; the song is retried no earlier than `next_copy_at`
pub async fn mark_copy_failed(pool: &SqlitePool, id: SongId, next_copy_at: i64) -> Result<()> {
    sqlx::query(
        "UPDATE songs
         SET file_state = 'failed', copy_attempts = copy_attempts + 1, next_copy_at = ?,
             updated_at = ?
         WHERE id = ?",
    )
    .bind(next_copy_at)
    .bind(now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Return songs stuck in `copy_pending` (an interrupted copy) to `bookmark_only`
pub async fn reset_interrupted_copies(pool: &SqlitePool) -> Result<u64> {
    let reset = sqlx::query(
        "UPDATE songs SET file_state = 'bookmark_only', updated_at = ?
         WHERE file_state = 'copy_pending'",
    )
    .bind(now())
    .execute(pool)
    .await?
    .rows_affected();

    if reset > 0 {
        tracing::info!("Reset {} interrupted copy(ies)", reset);
    }
    Ok(reset)
}

async fn set_state(pool: &SqlitePool, id: SongId, state: FileState) -> Result<()> {
    sqlx::query("UPDATE songs SET file_state = ?, updated_at = ? WHERE id = ?")
        .bind(state.as_str())
        .bind(now())
        .bind(id)
        .execute(pool)
        .await?;

    Ok(())
}
