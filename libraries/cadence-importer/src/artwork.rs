//! Content-addressed cover art
//!
//! Covers are stored once per distinct image: `CoverArt/cover-<sha256 hex>.<ext>`. Payloads
//! that do not decode as an image are ignored.

use cadence_core::identity::sha256_hex;
use image::ImageFormat;
use std::path::{Path, PathBuf};

pub const COVER_ART_DIR: &str = "CoverArt";

/// A cover written (or found) in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCover {
    /// Path relative to the library directory, e.g. `CoverArt/cover-ab12.png`
    pub relative_path: String,
    pub absolute_path: PathBuf,

    /// Whether this call created the file
    pub written: bool,
}

/// Cover art directory below a library directory
#[derive(Debug, Clone)]
pub struct CoverArtStore {
    library_dir: PathBuf,
}

impl CoverArtStore {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
        }
    }

    pub fn dir(&self) -> PathBuf {
        self.library_dir.join(COVER_ART_DIR)
    }

    /// Store the first payload that decodes as an image
    pub fn store_first_valid(&self, payloads: &[Vec<u8>]) -> std::io::Result<Option<StoredCover>> {
        for payload in payloads {
            if let Some(format) = validate_image(payload) {
                return self.store(payload, format).map(Some);
            }
            tracing::debug!("Ignoring embedded picture that is not a valid image");
        }
        Ok(None)
    }

    fn store(&self, bytes: &[u8], format: ImageFormat) -> std::io::Result<StoredCover> {
        let extension = format.extensions_str().first().copied().unwrap_or("img");
        let file_name = format!("cover-{}.{}", sha256_hex(bytes), extension);
        let absolute_path = self.dir().join(&file_name);
        let relative_path = format!("{COVER_ART_DIR}/{file_name}");

        if absolute_path.exists() {
            return Ok(StoredCover {
                relative_path,
                absolute_path,
                written: false,
            });
        }

        std::fs::create_dir_all(self.dir())?;
        write_atomically(&absolute_path, bytes)?;
        tracing::debug!("Stored cover {}", relative_path);

        Ok(StoredCover {
            relative_path,
            absolute_path,
            written: true,
        })
    }
}

/// Detected format of a payload that fully decodes
fn validate_image(bytes: &[u8]) -> Option<ImageFormat> {
    let format = image::guess_format(bytes).ok()?;
    image::load_from_memory_with_format(bytes, format).ok()?;
    Some(format)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp = path.with_extension("part");
    std::fs::write(&temp, bytes)?;
    std::fs::rename(&temp, path)
}
