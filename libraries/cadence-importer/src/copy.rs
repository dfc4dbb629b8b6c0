//! Background copy service
//!
//! Relocates the bytes of imported songs into app-private storage at
//! `Music/<sha256 hex>.<ext>`. Each song is copied to a temp file and renamed into place, so a
//! final path only ever holds complete content. A failing song is marked `failed` and retried
//! with exponential backoff until its attempts run out; it never stops the cycle.

use crate::error::CopyError;
use crate::metadata::calculate_file_hash;
use crate::types::CopyReport;
use crate::Result;
use cadence_access::{AccessHandle, Locator, LocatorResolver};
use cadence_core::Song;
use cadence_storage::songs;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const MUSIC_DIR: &str = "Music";

const TEMP_EXTENSION: &str = "part";

/// Scheduling and retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyConfig {
    /// Pause between cycles
    pub interval: Duration,

    /// Failed attempts after which a song is no longer retried
    pub max_attempts: u32,

    /// Delay before the first retry; doubled per further failure
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_attempts: 8,
            backoff_base: Duration::from_secs(30),
            backoff_max: Duration::from_secs(60 * 60),
        }
    }
}

impl CopyConfig {
    /// Delay before retrying after the `attempt`-th failure (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |delay| delay.min(self.backoff_max))
    }
}

pub struct BackgroundCopyService {
    pool: SqlitePool,
    resolver: Arc<dyn LocatorResolver>,
    library_dir: PathBuf,
    config: CopyConfig,
    running: AtomicBool,

    // Cycles never overlap, even when `run_cycle` is called while the loop runs
    cycle_lock: tokio::sync::Mutex<()>,
}

impl BackgroundCopyService {
    pub fn new(
        pool: SqlitePool,
        resolver: Arc<dyn LocatorResolver>,
        library_dir: impl Into<PathBuf>,
        config: CopyConfig,
    ) -> Self {
        Self {
            pool,
            resolver,
            library_dir: library_dir.into(),
            config,
            running: AtomicBool::new(false),
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn music_dir(&self) -> PathBuf {
        self.library_dir.join(MUSIC_DIR)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the copy loop. Returns `None` when it is already running.
    pub fn start(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Copy service already running");
            return None;
        }

        let service = Arc::clone(self);
        Some(tokio::spawn(async move {
            tracing::info!(
                "Copy service started (interval {:?})",
                service.config.interval
            );

            if let Err(e) = service.recover().await {
                tracing::error!("Copy service recovery failed: {}", e);
            }

            loop {
                if let Err(e) = service.run_cycle().await {
                    tracing::error!("Copy cycle failed: {}", e);
                }
                tokio::time::sleep(service.config.interval).await;
            }
        }))
    }

    /// Undo the traces of an interrupted process: songs stuck in `copy_pending` and temp files
    pub async fn recover(&self) -> Result<()> {
        songs::reset_interrupted_copies(&self.pool).await?;

        let music_dir = self.music_dir();
        let removed = tokio::task::spawn_blocking(move || sweep_temp_files(&music_dir)).await??;
        if removed > 0 {
            tracing::info!("Removed {} partial copy file(s)", removed);
        }
        Ok(())
    }

    /// Process every song that is due once
    pub async fn run_cycle(&self) -> Result<CopyReport> {
        let _cycle = self.cycle_lock.lock().await;

        let now = chrono::Utc::now().timestamp();
        let pending = songs::pending_copies(&self.pool, now, self.config.max_attempts).await?;
        let mut report = CopyReport::default();

        if pending.is_empty() {
            return Ok(report);
        }
        tracing::info!("Copying {} song(s)", pending.len());

        for song in pending {
            match self.copy_song(&song).await {
                Ok(local_path) => {
                    songs::mark_copied(&self.pool, song.id, &local_path).await?;
                    report.copied += 1;
                }
                Err(e) => {
                    let attempt = u32::try_from(song.copy_attempts + 1).unwrap_or(u32::MAX);
                    let delay = self.config.backoff(attempt);
                    let next_copy_at = chrono::Utc::now().timestamp()
                        + i64::try_from(delay.as_secs()).unwrap_or(i64::MAX / 2);

                    tracing::warn!(
                        "Copy of song {} failed (attempt {}/{}): {}",
                        song.id,
                        attempt,
                        self.config.max_attempts,
                        e
                    );
                    songs::mark_copy_failed(&self.pool, song.id, next_copy_at).await?;
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Copy cycle done: {} copied, {} failed",
            report.copied,
            report.failed
        );
        Ok(report)
    }

    /// Copy one song and return its path relative to the library directory
    async fn copy_song(&self, song: &Song) -> std::result::Result<String, CopyError> {
        songs::mark_copy_pending(&self.pool, song.id).await?;

        let resolved = self
            .resolver
            .resolve(&Locator::from_bytes(song.locator.clone()))?;
        if resolved.is_stale {
            let fresh = self.resolver.create(&resolved.path)?;
            songs::update_locator(&self.pool, song.id, fresh.as_bytes()).await?;
        }

        let extension = resolved
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| CopyError::MissingExtension(resolved.path.clone()))?;

        let handle = AccessHandle::open(Arc::clone(&self.resolver), resolved.path)?;
        let source = handle.path().to_path_buf();
        let music_dir = self.music_dir();

        let file_name =
            tokio::task::spawn_blocking(move || copy_into(&source, &music_dir, &extension))
                .await??;
        drop(handle);

        Ok(format!("{MUSIC_DIR}/{file_name}"))
    }
}

/// Copy `source` to `<dir>/<hash>.<ext>` through a temp file; returns the final file name
fn copy_into(
    source: &Path,
    dir: &Path,
    extension: &str,
) -> std::result::Result<String, CopyError> {
    std::fs::create_dir_all(dir)?;

    let hash = calculate_file_hash(source)?;
    let file_name = format!("{hash}.{extension}");
    let destination = dir.join(&file_name);
    let temp = dir.join(format!("{file_name}.{TEMP_EXTENSION}"));

    let result = (|| {
        std::fs::copy(source, &temp)?;
        if destination.exists() {
            std::fs::remove_file(&destination)?;
        }
        std::fs::rename(&temp, &destination)
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(&temp);
        return Err(e.into());
    }
    Ok(file_name)
}

fn sweep_temp_files(dir: &Path) -> std::io::Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(TEMP_EXTENSION) {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
