use super::source::SourceId;
use serde::{Deserialize, Serialize};

/// Scan generation tag; rows from older generations are pruned
pub type RunId = i64;

/// One filesystem entry below a source root, as of scan generation `run_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePath {
    pub id: i64,
    pub source_id: SourceId,

    /// Hash of the absolute path
    pub path_id: String,

    /// Hash of the parent directory's absolute path. Top-level entries point at the
    /// source's own `path_id`.
    pub parent_path_id: Option<String>,

    pub name: String,

    /// Path relative to the source root, `/`-separated
    pub relative_path: String,

    pub is_directory: bool,

    /// Content hash, recorded the first time the file is imported
    pub file_hash_sha256: Option<String>,

    pub run_id: RunId,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert-or-update request keyed by (source_id, path_id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertSourcePath {
    pub source_id: SourceId,
    pub path_id: String,
    pub parent_path_id: Option<String>,
    pub name: String,
    pub relative_path: String,
    pub is_directory: bool,
    pub run_id: RunId,
}

/// A full-text hit; rank follows FTS5 `bm25` (lower is more relevant)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSearchResult {
    pub path_id: String,
    pub rank: f64,
}
