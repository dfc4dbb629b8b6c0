//! Cadence Core
//!
//! Platform-agnostic domain types and identity helpers shared by every Cadence crate.
//!
//! # Architecture
//!
//! The core crate defines:
//! - **Domain Types**: `Source`, `SourcePath`, `Song` and their write requests
//! - **Identity**: content/path hashing and the normalization rules behind `path_id` and `song_key`
//! - **Error Handling**: `CadenceError` for parsing and validation failures
//!
//! # Example
//!
//! ```rust
//! use cadence_core::identity::{path_id, song_key};
//! use std::path::Path;
//!
//! let id = path_id(Path::new("/music/album/track.flac"));
//! assert_eq!(id.len(), 64);
//!
//! // Case and spacing do not change the identity of a song
//! assert_eq!(
//!     song_key("Queen", "Bohemian Rhapsody", "A Night at the Opera"),
//!     song_key(" queen ", "BOHEMIAN  rhapsody", "a night at the opera"),
//! );
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod identity;
pub mod types;

pub use error::{CadenceError, Result};
pub use types::{
    FileState, PathSearchResult, RunId, Song, SongId, Source, SourceId, SourcePath, SourceType,
    UpsertSong, UpsertSourcePath,
};
