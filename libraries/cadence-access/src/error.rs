/// Access-scope errors
use cadence_core::SourceId;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AccessError>;

#[derive(Error, Debug)]
pub enum AccessError {
    /// No locator was ever stored for the root
    #[error("No locator stored for key {key}")]
    MissingLocator { key: String },

    /// The locator points at something that no longer exists
    #[error("Location is unreachable: {}", path.display())]
    Unresolvable { path: PathBuf },

    /// The location exists but the process may not read it
    #[error("Access denied: {}", path.display())]
    Denied { path: PathBuf },

    /// A stale locator could not be renewed
    #[error("Failed to refresh stale locator for {}: {reason}", path.display())]
    RefreshFailed { path: PathBuf, reason: String },

    /// Locator bytes are not a locator
    #[error("Malformed locator: {0}")]
    Malformed(String),

    #[error("Source not found: {0}")]
    UnknownSource(SourceId),

    /// The key-value store backing locators failed
    #[error("Locator store error: {0}")]
    Store(String),

    #[error(transparent)]
    Storage(#[from] cadence_storage::StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AccessError {
    /// Map an I/O error on `path` to the access error it represents
    pub(crate) fn from_io(err: &std::io::Error, path: PathBuf) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::Denied { path }
        } else {
            Self::Unresolvable { path }
        }
    }
}
