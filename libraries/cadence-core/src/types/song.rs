//! Imported song records and the lifecycle of their locally copied bytes

use crate::CadenceError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type SongId = i64;

/// An imported song
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: SongId,

    /// Hash of the normalized (artist, title, album) triple; the upsert identity
    pub song_key: String,

    pub artist: String,
    pub title: String,
    pub album: String,
    pub album_artist: String,
    pub release_year: Option<i32>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,

    /// Content-addressed cover file under `CoverArt/`
    pub cover_art_path: Option<String>,

    /// Opaque access token for the original file
    pub locator: Vec<u8>,

    /// Hash of the original file's absolute path
    pub path_hash: String,

    /// Content-addressed copy under `Music/` once copied
    pub local_file_path: Option<String>,

    pub file_state: FileState,

    /// Failed copy attempts since the last import
    pub copy_attempts: i64,

    /// Earliest time a failed copy is retried (Unix epoch seconds)
    pub next_copy_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

/// Lifecycle of a song's locally copied bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Only the locator is known; bytes still live in the external folder
    #[default]
    BookmarkOnly,
    /// A copy is in flight
    CopyPending,
    /// Bytes live in app-private storage
    Copied,
    /// The last copy attempt failed
    Failed,
}

impl FileState {
    /// Convert to string for database storage
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookmarkOnly => "bookmark_only",
            Self::CopyPending => "copy_pending",
            Self::Copied => "copied",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for FileState {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bookmark_only" => Ok(Self::BookmarkOnly),
            "copy_pending" => Ok(Self::CopyPending),
            "copied" => Ok(Self::Copied),
            "failed" => Ok(Self::Failed),
            other => Err(CadenceError::invalid_input(format!(
                "unknown file state '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Insert-or-update request keyed by `song_key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertSong {
    pub song_key: String,
    pub artist: String,
    pub title: String,
    pub album: String,
    pub album_artist: String,
    pub release_year: Option<i32>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub cover_art_path: Option<String>,
    pub locator: Vec<u8>,
    pub path_hash: String,
}
