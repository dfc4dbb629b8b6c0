//! Locators: persisted, opaque tokens that re-open access to an external location
//!
//! A locator is created while access is granted (at registration or import time) and can be
//! stored as bytes. Resolving it later yields the location again, together with a staleness
//! flag telling the caller to replace the stored bytes with a freshly created locator.

use crate::error::{AccessError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Opaque locator bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator(Vec<u8>);

impl Locator {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Outcome of resolving a locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocator {
    pub path: PathBuf,

    /// The location is still valid but the locator should be recreated and persisted
    pub is_stale: bool,
}

/// Creates and resolves locators and opens access scopes on resolved locations
///
/// `start_access` and `stop_access` calls are paired by the caller; see
/// [`AccessHandle`](crate::AccessHandle).
pub trait LocatorResolver: Send + Sync {
    /// Create a locator for a location the process can currently access
    fn create(&self, path: &Path) -> Result<Locator>;

    fn resolve(&self, locator: &Locator) -> Result<ResolvedLocator>;

    /// Open an access scope on a resolved location
    fn start_access(&self, path: &Path) -> Result<()>;

    /// Close a scope opened by `start_access`
    fn stop_access(&self, path: &Path);
}

#[derive(Debug, Serialize, Deserialize)]
struct LocatorPayload {
    path: PathBuf,
    issued_at: i64,
    expires_at: i64,
}

/// Filesystem-backed resolver.
///
/// Locators carry the absolute path and an expiry. An expired locator whose path still exists
/// resolves as stale; a missing path is unresolvable. Open scopes are counted per path so
/// unbalanced open/close pairs are observable.
pub struct FsLocatorResolver {
    ttl: Duration,
    open_scopes: Mutex<HashMap<PathBuf, usize>>,
}

impl FsLocatorResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            open_scopes: Mutex::new(HashMap::new()),
        }
    }

    /// Number of scopes currently open across all paths
    pub fn open_scope_count(&self) -> usize {
        self.lock_scopes().values().sum()
    }

    fn lock_scopes(&self) -> MutexGuard<'_, HashMap<PathBuf, usize>> {
        self.open_scopes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_reachable(path: &Path) -> Result<()> {
        std::fs::metadata(path)
            .map(|_| ())
            .map_err(|e| AccessError::from_io(&e, path.to_path_buf()))
    }
}

impl Default for FsLocatorResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(7 * 24 * 60 * 60))
    }
}

impl LocatorResolver for FsLocatorResolver {
    fn create(&self, path: &Path) -> Result<Locator> {
        Self::check_reachable(path)?;

        let issued_at = chrono::Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let payload = LocatorPayload {
            path: path.to_path_buf(),
            issued_at,
            expires_at: issued_at.saturating_add(ttl),
        };

        let bytes =
            serde_json::to_vec(&payload).map_err(|e| AccessError::Malformed(e.to_string()))?;
        Ok(Locator(bytes))
    }

    fn resolve(&self, locator: &Locator) -> Result<ResolvedLocator> {
        let payload: LocatorPayload = serde_json::from_slice(locator.as_bytes())
            .map_err(|e| AccessError::Malformed(e.to_string()))?;

        Self::check_reachable(&payload.path)?;

        let is_stale = chrono::Utc::now().timestamp() >= payload.expires_at;
        Ok(ResolvedLocator {
            path: payload.path,
            is_stale,
        })
    }

    fn start_access(&self, path: &Path) -> Result<()> {
        let metadata =
            std::fs::metadata(path).map_err(|e| AccessError::from_io(&e, path.to_path_buf()))?;
        if metadata.is_dir() {
            std::fs::read_dir(path).map_err(|e| AccessError::from_io(&e, path.to_path_buf()))?;
        }

        *self.lock_scopes().entry(path.to_path_buf()).or_insert(0) += 1;
        tracing::debug!("Opened access scope on {}", path.display());
        Ok(())
    }

    fn stop_access(&self, path: &Path) {
        let mut scopes = self.lock_scopes();
        match scopes.get_mut(path) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                scopes.remove(path);
            }
            None => {
                tracing::warn!("Closing access scope that was never opened: {}", path.display());
                return;
            }
        }
        drop(scopes);
        tracing::debug!("Closed access scope on {}", path.display());
    }
}
