//! Source sync: scan a root and reconcile the path index with what was found

use crate::scanner::FileScanner;
use crate::types::{EntryKind, ScannedEntry, SyncReport};
use crate::{ImportError, Result};
use cadence_access::AccessScopeManager;
use cadence_core::identity::path_id;
use cadence_core::{RunId, Source, SourceId, UpsertSourcePath};
use cadence_storage::{source_paths, sources};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_BATCH_SIZE: usize = 500;

/// Keeps each source's path index in step with its root
pub struct SourceIndexer {
    pool: SqlitePool,
    access: Arc<AccessScopeManager>,
    scanner: FileScanner,
    batch_size: usize,
}

impl SourceIndexer {
    pub fn new(pool: SqlitePool, access: Arc<AccessScopeManager>) -> Self {
        Self {
            pool,
            access,
            scanner: FileScanner::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set how many entries are written per transaction
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sync the user's current source
    pub async fn sync_current(&self, user_id: &str) -> Result<SyncReport> {
        let source = sources::get_current(&self.pool, user_id)
            .await?
            .ok_or_else(|| ImportError::SourceNotFound(format!("current source of {user_id}")))?;
        self.sync_source(source.id).await
    }

    /// Scan a source's root and reconcile its path index.
    ///
    /// Audio files and directories are indexed under a fresh run id, then rows from earlier runs
    /// are pruned. A failure is recorded as the source's sync error before it is returned.
    pub async fn sync_source(&self, source_id: SourceId) -> Result<SyncReport> {
        let source = sources::get_by_id(&self.pool, source_id)
            .await?
            .ok_or_else(|| ImportError::SourceNotFound(source_id.to_string()))?;

        match self.sync(&source).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!("Sync of source {} failed: {}", source_id, e);
                if let Err(record_err) =
                    sources::set_sync_error(&self.pool, source_id, Some(&e.to_string())).await
                {
                    tracing::warn!("Could not record sync error: {}", record_err);
                }
                Err(e)
            }
        }
    }

    async fn sync(&self, source: &Source) -> Result<SyncReport> {
        let start_time = Instant::now();

        let batch = self.access.batch();
        // Keeps the scope open until the index is written, even if the cache entry is released
        let handle = batch.resolve(source.id).await?;
        let root = handle.path().to_path_buf();

        tracing::info!("Syncing source {} at {}", source.id, root.display());

        let scanner = self.scanner.clone();
        let entries = tokio::task::spawn_blocking(move || scanner.scan(&root)).await??;

        let run_id = sources::next_run_id(&self.pool, source.id).await?;
        let mut report = SyncReport {
            source_id: source.id,
            run_id,
            ..SyncReport::default()
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in &entries {
            match entry.kind {
                EntryKind::Directory => report.directories += 1,
                EntryKind::Audio => report.audio_files += 1,
                EntryKind::Other => {
                    report.other_files += 1;
                    continue;
                }
            }
            records.push(to_record(source.id, run_id, entry));
        }

        for chunk in records.chunks(self.batch_size) {
            let stats = source_paths::batch_upsert(&self.pool, chunk).await?;
            report.inserted += stats.inserted;
            report.updated += stats.updated;
        }

        report.pruned = source_paths::prune_stale(&self.pool, source.id, run_id).await?;

        let total = source_paths::count_by_source(&self.pool, source.id).await?;
        sources::record_sync(&self.pool, source.id, total).await?;

        tracing::info!(
            "Synced source {} (run {}): {} dirs, {} audio, {} other, {} new, {} pruned in {:?}",
            source.id,
            run_id,
            report.directories,
            report.audio_files,
            report.other_files,
            report.inserted,
            report.pruned,
            start_time.elapsed()
        );
        Ok(report)
    }
}

fn to_record(source_id: SourceId, run_id: RunId, entry: &ScannedEntry) -> UpsertSourcePath {
    UpsertSourcePath {
        source_id,
        path_id: path_id(&entry.absolute_path),
        parent_path_id: Some(path_id(&entry.parent_absolute_path)),
        name: entry.name.clone(),
        relative_path: entry.relative_path.clone(),
        is_directory: entry.is_directory,
        run_id,
    }
}
