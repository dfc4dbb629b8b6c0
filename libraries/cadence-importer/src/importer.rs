//! Import pipeline: turns selected path entries into songs
//!
//! Per file: resolve through the source's access scope, skip files already imported and still
//! reachable, hash the bytes, read tags, store the cover, create a locator and upsert the song
//! as `bookmark_only` so the copy service picks it up.
//!
//! One run is active at a time. Starting a run cancels the previous one and waits for it to
//! tear down first.

use crate::artwork::CoverArtStore;
use crate::metadata::{self, FileTags};
use crate::types::{ImportOutcome, ImportProgress, ImportState, ImportSummary};
use crate::{ImportError, Result};
use cadence_access::{AccessBatch, AccessScopeManager, Locator};
use cadence_core::identity::{path_id, song_key};
use cadence_core::{SourcePath, UpsertSong};
use cadence_storage::{songs, source_paths, sources};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};

enum FileOutcome {
    Imported,
    Skipped,
    Unresolved,
    Cancelled,
}

/// Media import orchestrator
pub struct MediaImporter {
    pool: SqlitePool,
    access: Arc<AccessScopeManager>,
    covers: CoverArtStore,

    // Held for the whole of a run
    run_lock: tokio::sync::Mutex<()>,
    cancel_flag: Mutex<Arc<AtomicBool>>,
    state_tx: watch::Sender<ImportState>,
}

impl MediaImporter {
    /// Create an importer writing covers below `library_dir`
    pub fn new(
        pool: SqlitePool,
        access: Arc<AccessScopeManager>,
        library_dir: impl Into<PathBuf>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ImportState::Idle);
        Self {
            pool,
            access,
            covers: CoverArtStore::new(library_dir),
            run_lock: tokio::sync::Mutex::new(()),
            cancel_flag: Mutex::new(Arc::new(AtomicBool::new(false))),
            state_tx,
        }
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<ImportState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ImportState {
        self.state_tx.borrow().clone()
    }

    /// Cancel the active run (if any) and wait until it has torn down
    pub async fn cancel_current(&self) {
        self.signal_cancel();
        let _idle = self.run_lock.lock().await;
    }

    fn signal_cancel(&self) {
        self.cancel_flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .store(true, Ordering::SeqCst);
    }

    /// Import the selected entries. Directories are expanded to every file below them.
    ///
    /// Progress is reported best-effort on `progress`; a full channel drops the update. The
    /// first per-file error aborts the run and is recorded as the source's sync error; songs
    /// upserted before it are kept.
    pub async fn import_selection(
        &self,
        entries: &[SourcePath],
        progress: Option<mpsc::Sender<ImportProgress>>,
    ) -> Result<ImportSummary> {
        self.signal_cancel();
        let _run = self.run_lock.lock().await;

        let cancel = Arc::new(AtomicBool::new(false));
        *self
            .cancel_flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&cancel);

        let result = self.run(entries, progress.as_ref(), &cancel).await;

        let state = match &result {
            Ok(summary) if summary.outcome == ImportOutcome::Cancelled => ImportState::Cancelled {
                imported: summary.imported,
            },
            Ok(summary) => ImportState::Completed {
                imported: summary.imported,
                skipped: summary.skipped,
            },
            Err(e) => ImportState::Failed {
                error: e.to_string(),
            },
        };
        self.state_tx.send_replace(state);
        result
    }

    async fn run(
        &self,
        entries: &[SourcePath],
        progress: Option<&mpsc::Sender<ImportProgress>>,
        cancel: &AtomicBool,
    ) -> Result<ImportSummary> {
        let files = self.expand_selection(entries).await?;
        let total = files.len();

        self.state_tx.send_replace(ImportState::Importing { total });
        tracing::info!("Importing {} file(s)", total);

        let mut summary = ImportSummary {
            outcome: ImportOutcome::Completed,
            imported: 0,
            skipped: 0,
            unresolved: 0,
        };

        // Releases every scope opened by this run on all exit paths
        let batch = self.access.batch();

        for (index, file) in files.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                summary.outcome = ImportOutcome::Cancelled;
                break;
            }

            let outcome = match self
                .import_file(&batch, file, index, total, progress, cancel)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Import aborted at {}: {}", file.relative_path, e);
                    if let Err(record_err) =
                        sources::set_sync_error(&self.pool, file.source_id, Some(&e.to_string()))
                            .await
                    {
                        tracing::warn!("Could not record import error: {}", record_err);
                    }
                    return Err(e);
                }
            };

            match outcome {
                FileOutcome::Imported => summary.imported += 1,
                FileOutcome::Skipped => summary.skipped += 1,
                FileOutcome::Unresolved => summary.unresolved += 1,
                FileOutcome::Cancelled => {
                    summary.outcome = ImportOutcome::Cancelled;
                    break;
                }
            }
        }

        drop(batch);

        tracing::info!(
            "Import {:?}: {} imported, {} skipped, {} unresolved",
            summary.outcome,
            summary.imported,
            summary.skipped,
            summary.unresolved
        );
        Ok(summary)
    }

    /// Replace directory entries by their files, keeping selection order and dropping repeats
    async fn expand_selection(&self, entries: &[SourcePath]) -> Result<Vec<SourcePath>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for entry in entries {
            let expanded = if entry.is_directory {
                source_paths::get_descendant_files(&self.pool, entry.source_id, &entry.path_id)
                    .await?
            } else {
                vec![entry.clone()]
            };

            for file in expanded {
                if seen.insert((file.source_id, file.path_id.clone())) {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }

    async fn import_file(
        &self,
        batch: &AccessBatch<'_>,
        file: &SourcePath,
        index: usize,
        total: usize,
        progress: Option<&mpsc::Sender<ImportProgress>>,
        cancel: &AtomicBool,
    ) -> Result<FileOutcome> {
        // Held until the song row is written
        let handle = match batch.resolve(file.source_id).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Skipping {}: {}", file.relative_path, e);
                return Ok(FileOutcome::Unresolved);
            }
        };

        let absolute = join_relative(handle.path(), &file.relative_path);
        if !absolute.is_file() {
            tracing::warn!("Skipping {}: file is gone", absolute.display());
            return Ok(FileOutcome::Unresolved);
        }

        if let Some(tx) = progress {
            let _ = tx.try_send(ImportProgress {
                percent: (index + 1) as f64 / total as f64 * 100.0,
                current_path: absolute.to_string_lossy().into_owned(),
            });
        }

        let path_hash = path_id(&absolute);
        if file.file_hash_sha256.is_some() && self.still_imported(&path_hash).await? {
            tracing::debug!("Skipping already imported {}", absolute.display());
            return Ok(FileOutcome::Skipped);
        }

        let read_path = absolute.clone();
        let (content_hash, file_tags) = tokio::task::spawn_blocking(move || {
            let content_hash = metadata::calculate_file_hash(&read_path)?;
            let file_tags: FileTags = metadata::read_file_tags(&read_path)?;
            Ok::<_, ImportError>((content_hash, file_tags))
        })
        .await??;

        // Nothing of a cancelled file reaches the database or the cover store
        if cancel.load(Ordering::SeqCst) {
            tracing::debug!("Dropping in-flight {}", absolute.display());
            return Ok(FileOutcome::Cancelled);
        }

        source_paths::set_file_hash(&self.pool, file.source_id, &file.path_id, &content_hash)
            .await?;

        let covers = self.covers.clone();
        let pictures = file_tags.pictures;
        let cover = tokio::task::spawn_blocking(move || covers.store_first_valid(&pictures)).await??;

        let locator = self.access.resolver().create(&absolute)?;

        let tags = file_tags.tags;
        let song = songs::upsert(
            &self.pool,
            &UpsertSong {
                song_key: song_key(&tags.artist, &tags.title, &tags.album),
                artist: tags.artist,
                title: tags.title,
                album: tags.album,
                album_artist: tags.album_artist,
                release_year: tags.release_year,
                disc_number: tags.disc_number,
                track_number: tags.track_number,
                cover_art_path: cover.map(|c| c.relative_path),
                locator: locator.into_bytes(),
                path_hash,
            },
        )
        .await?;

        tracing::debug!("Imported {} as song {}", absolute.display(), song.id);
        Ok(FileOutcome::Imported)
    }

    /// Whether a song imported from this path exists and its locator still resolves fresh
    async fn still_imported(&self, path_hash: &str) -> Result<bool> {
        let Some(song) = songs::get_by_path_hash(&self.pool, path_hash).await? else {
            return Ok(false);
        };

        let resolved = self
            .access
            .resolver()
            .resolve(&Locator::from_bytes(song.locator));
        Ok(matches!(resolved, Ok(r) if !r.is_stale))
    }
}

fn join_relative(root: &Path, relative_path: &str) -> PathBuf {
    relative_path
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}
