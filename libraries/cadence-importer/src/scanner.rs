//! Filesystem snapshot of a source root

use crate::error::ScanError;
use crate::types::{EntryKind, ScannedEntry};
use std::collections::HashSet;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

/// Audio extensions indexed by the scanner (lowercase)
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac", "aac", "aiff", "aif"];

/// Directory extensions that mark opaque platform bundles
const BUNDLE_EXTENSIONS: &[&str] = &[
    "app",
    "bundle",
    "framework",
    "plugin",
    "kext",
    "photoslibrary",
    "musiclibrary",
    "logicx",
    "band",
];

/// Scanner for source roots
#[derive(Debug, Clone, Default)]
pub struct FileScanner {
    follow_links: bool,
}

impl FileScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to follow symbolic links
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Walk `root` and return every visible entry below it.
    ///
    /// Fails only when the root itself cannot be read; unreadable entries further down are
    /// logged and skipped. Hidden entries and bundle directories are skipped with everything
    /// inside them. Each absolute path appears once.
    pub fn scan(&self, root: &Path) -> Result<Vec<ScannedEntry>, ScanError> {
        let metadata = std::fs::metadata(root).map_err(|source| ScanError::TraversalFailed {
            root: root.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }
        std::fs::read_dir(root).map_err(|source| ScanError::TraversalFailed {
            root: root.to_path_buf(),
            source,
        })?;

        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(self.follow_links)
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            let absolute_path = entry.path().to_path_buf();
            if !seen.insert(absolute_path.to_string_lossy().into_owned()) {
                continue;
            }

            let Some(relative_path) = relative_path(root, &absolute_path) else {
                tracing::warn!("Entry outside root: {}", absolute_path.display());
                continue;
            };
            let Some(parent_absolute_path) = absolute_path.parent().map(Path::to_path_buf) else {
                continue;
            };

            let is_directory = entry.file_type().is_dir();
            let kind = if is_directory {
                EntryKind::Directory
            } else if is_audio_file(&absolute_path) {
                EntryKind::Audio
            } else {
                EntryKind::Other
            };

            entries.push(ScannedEntry {
                relative_path,
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory,
                kind,
                absolute_path,
                parent_absolute_path,
            });
        }

        tracing::debug!("Scanned {} entries below {}", entries.len(), root.display());
        Ok(entries)
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    // The root is never skipped, even when its own name is hidden
    if entry.depth() == 0 {
        return false;
    }

    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }

    entry.file_type().is_dir()
        && entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| BUNDLE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Check if a file has an indexed audio extension
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
