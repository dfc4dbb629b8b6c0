//! Common types for the importer

use cadence_core::{RunId, SourceId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the scanner classified an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    Audio,
    Other,
}

/// One filesystem entry found below a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    /// Path relative to the root, `/`-separated
    pub relative_path: String,
    pub name: String,
    pub is_directory: bool,
    pub kind: EntryKind,
    pub absolute_path: PathBuf,

    /// The directory the OS reports as parent; the root itself for top-level entries
    pub parent_absolute_path: PathBuf,
}

/// Outcome of one source sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub source_id: SourceId,
    pub run_id: RunId,
    pub directories: u64,
    pub audio_files: u64,

    /// Non-audio files seen but not indexed
    pub other_files: u64,

    pub inserted: u64,
    pub updated: u64,
    pub pruned: u64,
}

/// Import pipeline state, published on a watch channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    Importing { total: usize },
    Completed { imported: usize, skipped: usize },
    Cancelled { imported: usize },
    Failed { error: String },
}

/// Best-effort progress report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    /// `(index + 1) / total * 100`
    pub percent: f64,
    pub current_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOutcome {
    Completed,
    Cancelled,
}

/// Result of a finished or cancelled import run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub outcome: ImportOutcome,
    pub imported: usize,

    /// Already imported and still reachable
    pub skipped: usize,

    /// Entries whose file could not be located
    pub unresolved: usize,
}

/// Outcome of one background copy pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyReport {
    pub copied: usize,
    pub failed: usize,
}
