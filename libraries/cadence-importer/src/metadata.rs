//! Tag extraction with deterministic fallbacks
//!
//! Which tag keys feed which song field is declared once in [`TAG_TABLE`]. The first key of a
//! row that yields a usable value wins; rows that yield nothing fall back to fixed values.

use crate::{ImportError, Result};
use cadence_core::identity::normalize_text;
use lofty::{ItemKey, Probe, Tag, TaggedFileExt};
use std::path::Path;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Song field a tag value is read into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Artist,
    Title,
    Album,
    AlbumArtist,
    ReleaseYear,
    DiscNumber,
    TrackNumber,
}

/// Tag keys consulted per field, in priority order
pub const TAG_TABLE: &[(Field, &[ItemKey])] = &[
    (Field::Artist, &[ItemKey::TrackArtist]),
    (Field::Title, &[ItemKey::TrackTitle]),
    (Field::Album, &[ItemKey::AlbumTitle]),
    (Field::AlbumArtist, &[ItemKey::AlbumArtist]),
    (
        Field::ReleaseYear,
        &[
            ItemKey::Year,
            ItemKey::RecordingDate,
            ItemKey::OriginalReleaseDate,
        ],
    ),
    (Field::DiscNumber, &[ItemKey::DiscNumber]),
    (Field::TrackNumber, &[ItemKey::TrackNumber]),
];

/// Song fields after fallbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongTags {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub album_artist: String,
    pub release_year: Option<i32>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
}

/// Everything the import pipeline reads from a file's tags
#[derive(Debug, Clone)]
pub struct FileTags {
    pub tags: SongTags,

    /// Embedded picture payloads, front cover first
    pub pictures: Vec<Vec<u8>>,
}

/// Read tags and pictures from `path`.
///
/// A readable file without tags gets the fallback values; a file lofty cannot parse is an error.
pub fn read_file_tags(path: &Path) -> Result<FileTags> {
    let tagged_file = Probe::open(path)
        .and_then(|file| file.read())
        .map_err(|e| ImportError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let tag = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag());

    let mut pictures: Vec<&lofty::Picture> = tag
        .map(|t| t.pictures().iter().collect())
        .unwrap_or_default();
    pictures.sort_by_key(|p| !matches!(p.pic_type(), lofty::PictureType::CoverFront));

    Ok(FileTags {
        tags: song_tags(tag, path),
        pictures: pictures.into_iter().map(|p| p.data().to_vec()).collect(),
    })
}

/// Resolve song fields from an optional tag, applying fallbacks
pub fn song_tags(tag: Option<&Tag>, path: &Path) -> SongTags {
    let raw = |field: Field| tag.and_then(|t| lookup(t, field));
    let text = |field: Field| {
        raw(field)
            .map(|v| normalize_text(&v))
            .filter(|v| !v.is_empty())
    };

    let artist = text(Field::Artist).unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
    let title = text(Field::Title)
        .or_else(|| title_from_path(path))
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let album = text(Field::Album).unwrap_or_else(|| UNKNOWN_ALBUM.to_string());
    let album_artist = text(Field::AlbumArtist).unwrap_or_else(|| artist.clone());

    SongTags {
        artist,
        title,
        album,
        album_artist,
        release_year: raw(Field::ReleaseYear).and_then(|v| parse_year(&v)),
        disc_number: raw(Field::DiscNumber).and_then(|v| parse_position(&v)),
        track_number: raw(Field::TrackNumber).and_then(|v| parse_position(&v)),
    }
}

fn lookup(tag: &Tag, field: Field) -> Option<String> {
    let (_, keys) = TAG_TABLE.iter().find(|(f, _)| *f == field)?;
    keys.iter().find_map(|key| {
        tag.get_string(key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

fn title_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| normalize_text(&stem.to_string_lossy()))
        .filter(|stem| !stem.is_empty())
}

/// Leading four-digit year of values like `1999` or `1999-05-01`
fn parse_year(value: &str) -> Option<i32> {
    let digits: String = value.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Track or disc position of values like `3` or `3/12`
fn parse_position(value: &str) -> Option<u32> {
    value
        .split('/')
        .next()
        .and_then(|n| n.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

/// Calculate SHA-256 hash of a file
pub fn calculate_file_hash(path: &Path) -> std::io::Result<String> {
    use sha2::{Digest, Sha256};
    use std::fs::File;
    use std::io::Read;

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
