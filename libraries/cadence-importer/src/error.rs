//! Error types for scanning, importing and copying

use std::path::PathBuf;
use thiserror::Error;

/// Fatal scanner errors. Per-entry failures are logged and skipped instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Cannot traverse {}: {source}", root.display())]
    TraversalFailed {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage layer error: {0}")]
    StorageLayer(#[from] cadence_storage::StorageError),

    #[error("Access error: {0}")]
    Access(#[from] cadence_access::AccessError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Cannot read tags of {}: {reason}", path.display())]
    Metadata { path: PathBuf, reason: String },

    #[error(transparent)]
    Core(#[from] cadence_core::CadenceError),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ImportError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Failure to relocate one song. Never escapes a copy cycle.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("Original is not reachable: {0}")]
    Access(#[from] cadence_access::AccessError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Original has no file extension: {}", .0.display())]
    MissingExtension(PathBuf),

    #[error("Storage layer error: {0}")]
    StorageLayer(#[from] cadence_storage::StorageError),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for CopyError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
