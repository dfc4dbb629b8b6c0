//! Stable identities derived from paths and tag values.
//!
//! Every id in the index is a lowercase SHA-256 hex digest so it can be recomputed from the
//! filesystem alone: a path id from the absolute path, a song key from the normalized
//! (artist, title, album) triple.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// SHA-256 of `bytes` as lowercase hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Lexically normalize a root path: drops `.` components, resolves `..` against the
/// preceding component and strips trailing separators.
///
/// The filesystem is not consulted, so the result is stable even when the root is
/// temporarily unreachable.
pub fn normalize_root(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component.as_os_str());
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Id of a filesystem entry: hash of its absolute path string
pub fn path_id(path: &Path) -> String {
    sha256_hex(path.to_string_lossy().as_bytes())
}

/// Collapse runs of whitespace, trim and drop control characters
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

/// Identity of a song: hash of the lowercased, whitespace-normalized triple
pub fn song_key(artist: &str, title: &str, album: &str) -> String {
    let joined = [artist, title, album]
        .iter()
        .map(|part| normalize_text(part).to_lowercase())
        .collect::<Vec<_>>()
        .join("\u{1f}");
    sha256_hex(joined.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn normalize_root_strips_dots_and_trailing_separator() {
        assert_eq!(
            normalize_root(Path::new("/music/./rock/../jazz/")),
            PathBuf::from("/music/jazz")
        );
        assert_eq!(normalize_root(Path::new("/music")), PathBuf::from("/music"));
    }

    #[test]
    fn path_id_matches_for_equivalent_roots() {
        let a = path_id(&normalize_root(Path::new("/music/jazz/")));
        let b = path_id(&normalize_root(Path::new("/music/./jazz")));
        assert_eq!(a, b);
        assert_ne!(a, path_id(Path::new("/music/rock")));
    }

    #[test]
    fn normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("  Dark   Side\tof the\nMoon "), "Dark Side of the Moon");
        assert_eq!(normalize_text("Nul\u{0}l"), "Null");
    }

    #[test]
    fn song_key_ignores_case_and_spacing() {
        let a = song_key("Miles Davis", "So What", "Kind of Blue");
        let b = song_key("miles  davis", " SO WHAT", "kind of blue ");
        assert_eq!(a, b);
    }

    #[test]
    fn song_key_fields_do_not_bleed_into_each_other() {
        assert_ne!(song_key("ab", "c", "d"), song_key("a", "bc", "d"));
    }
}
