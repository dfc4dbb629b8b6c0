//! Source registration
//!
//! Registering a root normalizes its path, stores a root locator under the root's `path_id`
//! and makes the source the user's current one.

use crate::{ImportError, Result};
use cadence_access::AccessScopeManager;
use cadence_core::identity::{normalize_root, path_id};
use cadence_core::{Source, SourceId, SourceType};
use cadence_storage::sources;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

pub struct SourceRegistry {
    pool: SqlitePool,
    access: Arc<AccessScopeManager>,
}

impl SourceRegistry {
    pub fn new(pool: SqlitePool, access: Arc<AccessScopeManager>) -> Self {
        Self { pool, access }
    }

    /// Register `root` for `user_id` and make it current
    pub async fn register_root(
        &self,
        user_id: &str,
        root: &Path,
        source_type: SourceType,
    ) -> Result<Source> {
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        let normalized = normalize_root(&absolute);
        let id = path_id(&normalized);

        self.access.remember_root(&id, &normalized).await?;

        let source = sources::register(
            &self.pool,
            user_id,
            &normalized.to_string_lossy(),
            &id,
            source_type,
        )
        .await?;

        tracing::info!(
            "Registered {} root {} as source {}",
            source_type,
            normalized.display(),
            source.id
        );
        Ok(source)
    }

    pub async fn get_current(&self, user_id: &str) -> Result<Option<Source>> {
        Ok(sources::get_current(&self.pool, user_id).await?)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Source>> {
        Ok(sources::get_by_user(&self.pool, user_id).await?)
    }

    pub async fn set_current(&self, user_id: &str, source_id: SourceId) -> Result<()> {
        Ok(sources::set_current(&self.pool, user_id, source_id).await?)
    }

    /// Remove a source, its indexed paths and its stored locator.
    ///
    /// Imported songs are kept.
    pub async fn remove(&self, source_id: SourceId) -> Result<()> {
        let source = sources::get_by_id(&self.pool, source_id)
            .await?
            .ok_or_else(|| ImportError::SourceNotFound(source_id.to_string()))?;

        self.access.release(source_id);
        sources::delete(&self.pool, source_id).await?;

        // Other users may still have the same root registered
        if sources::count_by_path_id(&self.pool, &source.path_id).await? == 0 {
            self.access.forget_root(&source.path_id).await?;
        }

        tracing::info!("Removed source {} ({})", source_id, source.root_path);
        Ok(())
    }
}
