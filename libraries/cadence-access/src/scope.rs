//! Access scopes on source roots
//!
//! [`AccessScopeManager::resolve`] turns a source id into an open [`AccessHandle`] on the
//! source's root, renewing a stale locator on the way. One handle per source is cached until it
//! is released, so resolving many entries of the same source opens a single scope.

use crate::error::{AccessError, Result};
use crate::locator::{Locator, LocatorResolver};
use crate::store::LocatorStore;
use cadence_core::SourceId;
use cadence_storage::sources;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// An open access scope. The scope closes when the handle is dropped.
pub struct AccessHandle {
    path: PathBuf,
    resolver: Arc<dyn LocatorResolver>,
}

impl AccessHandle {
    /// Open a scope on `path`
    pub fn open(resolver: Arc<dyn LocatorResolver>, path: PathBuf) -> Result<Self> {
        resolver.start_access(&path)?;
        Ok(Self { path, resolver })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AccessHandle {
    fn drop(&mut self) {
        self.resolver.stop_access(&self.path);
    }
}

impl std::fmt::Debug for AccessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessHandle")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Resolves, caches and releases root access scopes
pub struct AccessScopeManager {
    pool: SqlitePool,
    resolver: Arc<dyn LocatorResolver>,
    store: Arc<dyn LocatorStore>,
    handles: Mutex<HashMap<SourceId, Arc<AccessHandle>>>,

    // Serializes the slow path so concurrent first calls open one scope
    resolve_gate: tokio::sync::Mutex<()>,
}

impl AccessScopeManager {
    pub fn new(
        pool: SqlitePool,
        resolver: Arc<dyn LocatorResolver>,
        store: Arc<dyn LocatorStore>,
    ) -> Self {
        Self {
            pool,
            resolver,
            store,
            handles: Mutex::new(HashMap::new()),
            resolve_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn resolver(&self) -> Arc<dyn LocatorResolver> {
        Arc::clone(&self.resolver)
    }

    /// Create and persist the locator of a root the process can currently access.
    ///
    /// Called at registration time, while access is known to be granted.
    pub async fn remember_root(&self, path_id: &str, root: &Path) -> Result<Locator> {
        let locator = self.resolver.create(root)?;
        self.store.set(path_id, locator.as_bytes()).await?;
        tracing::debug!("Stored root locator for {}", root.display());
        Ok(locator)
    }

    /// Drop the stored locator of a root
    pub async fn forget_root(&self, path_id: &str) -> Result<()> {
        self.store.remove(path_id).await
    }

    /// Open (or reuse) the access scope on a source's root
    pub async fn resolve(&self, source_id: SourceId) -> Result<Arc<AccessHandle>> {
        if let Some(handle) = self.cached(source_id) {
            return Ok(handle);
        }

        let _gate = self.resolve_gate.lock().await;
        if let Some(handle) = self.cached(source_id) {
            return Ok(handle);
        }

        let source = sources::get_by_id(&self.pool, source_id)
            .await?
            .ok_or(AccessError::UnknownSource(source_id))?;

        let bytes = self
            .store
            .get(&source.path_id)
            .await?
            .ok_or_else(|| AccessError::MissingLocator {
                key: source.path_id.clone(),
            })?;

        let resolved = self.resolver.resolve(&Locator::from_bytes(bytes))?;
        if resolved.is_stale {
            let fresh = self.resolver.create(&resolved.path).map_err(|e| {
                AccessError::RefreshFailed {
                    path: resolved.path.clone(),
                    reason: e.to_string(),
                }
            })?;
            self.store.set(&source.path_id, fresh.as_bytes()).await?;
            tracing::info!("Renewed stale locator for source {}", source_id);
        }

        let handle = Arc::new(AccessHandle::open(
            Arc::clone(&self.resolver),
            resolved.path,
        )?);

        self.lock_handles().insert(source_id, Arc::clone(&handle));
        Ok(handle)
    }

    /// Evict the cached handle of one source. The scope closes once no caller holds the handle.
    pub fn release(&self, source_id: SourceId) {
        let handle = self.lock_handles().remove(&source_id);
        drop(handle);
    }

    /// Close and evict every cached handle
    pub fn release_all(&self) {
        let drained: Vec<_> = self
            .lock_handles()
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        if !drained.is_empty() {
            tracing::debug!("Releasing {} access scope(s)", drained.len());
        }
    }

    /// Number of cached handles
    pub fn open_handles(&self) -> usize {
        self.lock_handles().len()
    }

    /// Guard that releases the handles resolved through it when dropped
    pub fn batch(&self) -> AccessBatch<'_> {
        AccessBatch {
            manager: self,
            resolved: Mutex::new(HashSet::new()),
        }
    }

    fn cached(&self, source_id: SourceId) -> Option<Arc<AccessHandle>> {
        self.lock_handles().get(&source_id).cloned()
    }

    // Every map update is a single call, so the map stays consistent under a poisoned lock
    fn lock_handles(&self) -> MutexGuard<'_, HashMap<SourceId, Arc<AccessHandle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scope of a batch of resolves.
///
/// Dropping it releases the sources resolved through this batch only; handles cached by other
/// consumers stay open.
pub struct AccessBatch<'a> {
    manager: &'a AccessScopeManager,
    resolved: Mutex<HashSet<SourceId>>,
}

impl AccessBatch<'_> {
    pub async fn resolve(&self, source_id: SourceId) -> Result<Arc<AccessHandle>> {
        let handle = self.manager.resolve(source_id).await?;
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source_id);
        Ok(handle)
    }
}

impl Drop for AccessBatch<'_> {
    fn drop(&mut self) {
        let resolved = std::mem::take(
            self.resolved
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for source_id in resolved {
            self.manager.release(source_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FsLocatorResolver, MemoryLocatorStore};
    use cadence_core::SourceType;

    #[tokio::test]
    async fn test_poisoned_cache_still_reuses_handle() {
        let data_dir = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let pool = cadence_storage::open_library(data_dir.path()).await.unwrap();

        let path_id = cadence_core::identity::path_id(root.path());
        let source = sources::register(
            &pool,
            "user-1",
            &root.path().to_string_lossy(),
            &path_id,
            SourceType::Folder,
        )
        .await
        .unwrap();

        let resolver = Arc::new(FsLocatorResolver::default());
        let manager =
            AccessScopeManager::new(pool, resolver.clone(), Arc::new(MemoryLocatorStore::new()));
        manager.remember_root(&path_id, root.path()).await.unwrap();

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = manager.handles.lock().unwrap();
            panic!("poison the handle cache");
        }));
        assert!(panicked.is_err());
        assert!(manager.handles.is_poisoned());

        let first = manager.resolve(source.id).await.unwrap();
        let second = manager.resolve(source.id).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.open_scope_count(), 1);
        assert_eq!(manager.open_handles(), 1);
    }
}
