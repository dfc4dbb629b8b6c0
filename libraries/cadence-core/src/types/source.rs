//! Source types for registered library roots
//!
//! A source is a folder the user granted access to. Each user has at most one current source.

use crate::CadenceError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type SourceId = i64;

/// A registered root folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Unique ID
    pub id: SourceId,

    /// Owner user ID (resolved externally)
    pub user_id: String,

    /// Normalized absolute path of the root
    pub root_path: String,

    /// Hash of the normalized root path; also the key of the root locator
    pub path_id: String,

    /// Kind of storage the root lives on
    pub source_type: SourceType,

    /// Number of indexed entries after the last sync
    pub total_paths: i64,

    /// Human readable error from the last failed sync or import
    pub sync_error: Option<String>,

    /// Whether this is the user's current source
    pub is_current: bool,

    /// Latest scan generation issued for this source (0 before the first sync)
    pub last_run_id: i64,

    /// Created timestamp (Unix epoch seconds)
    pub created_at: i64,

    /// Last successful sync (Unix epoch seconds)
    pub last_synced_at: Option<i64>,

    /// Last updated timestamp (Unix epoch seconds)
    pub updated_at: i64,
}

/// Kind of storage a source root lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// A folder on a local disk
    #[default]
    Folder,
    /// A removable or network volume that may be unmounted between syncs
    Volume,
    /// A folder materialized by a cloud drive client
    Cloud,
}

impl SourceType {
    /// Convert to string for database storage
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Volume => "volume",
            Self::Cloud => "cloud",
        }
    }
}

impl FromStr for SourceType {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "folder" => Ok(Self::Folder),
            "volume" => Ok(Self::Volume),
            "cloud" => Ok(Self::Cloud),
            other => Err(CadenceError::invalid_input(format!(
                "unknown source type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
