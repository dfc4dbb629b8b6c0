//! Integration tests for the import pipeline


use cadence_core::{FileState, SourcePath};
use cadence_importer::artwork::COVER_ART_DIR;
use cadence_importer::{ImportError, ImportOutcome, ImportState};
use cadence_storage::{songs, source_paths, sources};
use std::sync::Arc;
use test_helpers::*;
use tokio::sync::mpsc;

async fn synced(harness: &Harness) -> Vec<SourcePath> {
    harness
        .indexer
        .sync_source(harness.source.id)
        .await
        .expect("Sync failed");
    harness.indexed_files().await
}

#[tokio::test]
async fn test_import_creates_bookmark_only_songs() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    harness.add_track("b.wav", 2);
    harness.add_track("subdir/c.wav", 3);
    let files = synced(&harness).await;

    let summary = harness
        .importer
        .import_selection(&files, None)
        .await
        .expect("Import failed");

    assert_eq!(summary.outcome, ImportOutcome::Completed);
    assert_eq!(summary.imported, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.unresolved, 0);

    let all = harness.all_songs().await;
    assert_eq!(all.len(), 3);
    for song in &all {
        assert_eq!(song.file_state, FileState::BookmarkOnly);
        assert!(song.local_file_path.is_none());
        assert!(!song.locator.is_empty());
    }

    let mut titles: Vec<_> = all.iter().map(|s| s.title.clone()).collect();
    titles.sort();
    assert_eq!(titles, vec!["a", "b", "c"]);

    assert_eq!(
        harness.importer.state(),
        ImportState::Completed {
            imported: 3,
            skipped: 0
        }
    );
}

#[tokio::test]
async fn test_import_records_content_hashes() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    let files = synced(&harness).await;
    assert!(files[0].file_hash_sha256.is_none());

    harness.importer.import_selection(&files, None).await.unwrap();

    let pending = source_paths::pending_hash(&harness.pool, harness.source.id)
        .await
        .unwrap();
    assert!(pending.is_empty());

    let row = source_paths::get_by_path(&harness.pool, harness.source.id, "a.wav")
        .await
        .unwrap()
        .unwrap();
    let expected = cadence_importer::metadata::calculate_file_hash(&harness.music_root.join("a.wav"))
        .unwrap();
    assert_eq!(row.file_hash_sha256.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn test_second_import_skips_reachable_files() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    harness.add_track("b.wav", 2);
    harness.add_track("subdir/c.wav", 3);
    synced(&harness).await;
    let files = harness.indexed_files().await;
    harness.importer.import_selection(&files, None).await.unwrap();

    // Reload so the rows carry their content hashes
    let files = harness.indexed_files().await;
    let summary = harness.importer.import_selection(&files, None).await.unwrap();

    assert_eq!(summary.imported, 0);
    assert_eq!(summary.skipped, 3);
    assert_eq!(songs::count(&harness.pool).await.unwrap(), 3);
}

#[tokio::test]
async fn test_directory_selection_expands_to_files() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    harness.add_track("album/one.wav", 2);
    harness.add_track("album/disc2/two.wav", 3);
    synced(&harness).await;

    let album = source_paths::get_by_path(&harness.pool, harness.source.id, "album")
        .await
        .unwrap()
        .unwrap();
    let one = source_paths::get_by_path(&harness.pool, harness.source.id, "album/one.wav")
        .await
        .unwrap()
        .unwrap();

    // The file also selected on its own is imported once
    let summary = harness
        .importer
        .import_selection(&[album, one], None)
        .await
        .unwrap();

    assert_eq!(summary.imported, 2);
    let mut titles: Vec<_> = harness.all_songs().await.into_iter().map(|s| s.title).collect();
    titles.sort();
    assert_eq!(titles, vec!["one", "two"]);
}

#[tokio::test]
async fn test_same_metadata_collapses_to_one_song() {
    let harness = Harness::new().await;
    harness.add_track("first/track.wav", 1);
    harness.add_track("second/track.wav", 2);
    let files = synced(&harness).await;

    let summary = harness.importer.import_selection(&files, None).await.unwrap();

    assert_eq!(summary.imported, 2);
    let all = harness.all_songs().await;
    assert_eq!(all.len(), 1);

    // The later file wins the locator
    let second = harness.music_root.join("second/track.wav");
    assert_eq!(all[0].path_hash, cadence_core::identity::path_id(&second));
}

#[tokio::test]
async fn test_vanished_file_is_unresolved() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    let gone = harness.add_track("b.wav", 2);
    let files = synced(&harness).await;
    std::fs::remove_file(gone).unwrap();

    let summary = harness.importer.import_selection(&files, None).await.unwrap();

    assert_eq!(summary.outcome, ImportOutcome::Completed);
    assert_eq!(summary.imported, 1);
    assert_eq!(summary.unresolved, 1);
}

#[tokio::test]
async fn test_import_reports_progress() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    harness.add_track("b.wav", 2);
    let files = synced(&harness).await;

    let (tx, mut rx) = mpsc::channel(16);
    harness.importer.import_selection(&files, Some(tx)).await.unwrap();

    let mut reports = Vec::new();
    while let Some(progress) = rx.recv().await {
        reports.push(progress);
    }

    assert_eq!(reports.len(), 2);
    assert!((reports[0].percent - 50.0).abs() < f64::EPSILON);
    assert!((reports[1].percent - 100.0).abs() < f64::EPSILON);
    assert!(reports[1].current_path.ends_with("b.wav"));
}

#[tokio::test]
async fn test_import_releases_access_scopes() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    let files = synced(&harness).await;

    harness.importer.import_selection(&files, None).await.unwrap();

    assert_eq!(harness.access.open_handles(), 0);
    assert_eq!(harness.resolver.open_scope_count(), 0);
}

#[tokio::test]
async fn test_cancel_stops_import_early() {
    let harness = Harness::new().await;
    for i in 0..100u8 {
        harness.add_track(&format!("bulk/track-{i:03}.wav"), i);
    }
    let files = synced(&harness).await;
    assert_eq!(files.len(), 100);

    let importer = Arc::clone(&harness.importer);
    let (tx, mut rx) = mpsc::channel(1);
    let run = tokio::spawn(async move { importer.import_selection(&files, Some(tx)).await });

    // First progress means the run is under way
    rx.recv().await.expect("No progress reported");
    harness.importer.cancel_current().await;

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.outcome, ImportOutcome::Cancelled);
    assert!(summary.imported < 100);
    assert_eq!(
        songs::count(&harness.pool).await.unwrap(),
        summary.imported as i64
    );
    assert!(matches!(
        harness.importer.state(),
        ImportState::Cancelled { .. }
    ));
    assert_eq!(harness.access.open_handles(), 0);
}

#[tokio::test]
async fn test_cancelled_files_leave_no_hash_or_cover() {
    let harness = Harness::new().await;
    for i in 0..40u8 {
        let title = format!("Take {i}");
        harness.add_tagged_track(
            &format!("bulk/take-{i:02}.wav"),
            i,
            TrackTags {
                artist: "Quartet",
                title: &title,
                album: "Sessions",
                track: u32::from(i) + 1,
            },
            Some(&png_bytes([i, 64, 128])),
        );
    }
    let files = synced(&harness).await;

    let importer = Arc::clone(&harness.importer);
    let (tx, mut rx) = mpsc::channel(1);
    let run = tokio::spawn(async move { importer.import_selection(&files, Some(tx)).await });
    rx.recv().await.expect("No progress reported");
    harness.importer.cancel_current().await;

    let summary = run.await.unwrap().unwrap();
    let imported = songs::count(&harness.pool).await.unwrap() as usize;
    assert_eq!(imported, summary.imported);

    // Only files that became songs carry a hash or left a cover behind
    let pending = source_paths::pending_hash(&harness.pool, harness.source.id)
        .await
        .unwrap();
    assert_eq!(pending.len(), 40 - imported);
    assert_eq!(harness.stored_covers().len(), imported);
}

#[tokio::test]
async fn test_new_import_cancels_running_one() {
    let harness = Harness::new().await;
    for i in 0..60u8 {
        harness.add_track(&format!("bulk/track-{i:03}.wav"), i);
    }
    let files = synced(&harness).await;
    let first_batch = files.clone();

    let importer = Arc::clone(&harness.importer);
    let (tx, mut rx) = mpsc::channel(1);
    let first = tokio::spawn(async move { importer.import_selection(&first_batch, Some(tx)).await });
    rx.recv().await.expect("No progress reported");

    let second = harness.importer.import_selection(&files, None).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.outcome, ImportOutcome::Cancelled);
    assert_eq!(second.outcome, ImportOutcome::Completed);
    assert_eq!(songs::count(&harness.pool).await.unwrap(), 60);
}

#[tokio::test]
async fn test_unreachable_source_counts_unresolved() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    let files = synced(&harness).await;
    std::fs::remove_dir_all(&harness.music_root).unwrap();

    let summary = harness.importer.import_selection(&files, None).await.unwrap();

    assert_eq!(summary.imported, 0);
    assert_eq!(summary.unresolved, 1);
    let source = sources::get_by_id(&harness.pool, harness.source.id)
        .await
        .unwrap()
        .unwrap();
    assert!(source.sync_error.is_none());
}

#[tokio::test]
async fn test_import_reads_tags_and_cover() {
    let harness = Harness::new().await;
    let cover = png_bytes([200, 30, 30]);
    harness.add_tagged_track(
        "Coltrane/01.wav",
        1,
        TrackTags {
            artist: "John Coltrane",
            title: "Giant Steps",
            album: "Giant Steps",
            track: 1,
        },
        Some(&cover),
    );
    let files = synced(&harness).await;

    harness.importer.import_selection(&files, None).await.unwrap();

    let all = harness.all_songs().await;
    assert_eq!(all.len(), 1);
    let song = &all[0];
    assert_eq!(song.artist, "John Coltrane");
    assert_eq!(song.title, "Giant Steps");
    assert_eq!(song.album, "Giant Steps");
    assert_eq!(song.album_artist, "John Coltrane");
    assert_eq!(song.track_number, Some(1));

    let cover_path = song.cover_art_path.as_deref().expect("Song has no cover");
    assert!(cover_path.starts_with(&format!("{COVER_ART_DIR}/cover-")));
    assert!(cover_path.ends_with(".png"));
    assert_eq!(std::fs::read(harness.library_path(cover_path)).unwrap(), cover);
}

#[tokio::test]
async fn test_identical_covers_are_stored_once() {
    let harness = Harness::new().await;
    let cover = png_bytes([10, 120, 240]);
    for (i, title) in ["Naima", "Countdown"].into_iter().enumerate() {
        harness.add_tagged_track(
            &format!("Giant Steps/{title}.wav"),
            i as u8,
            TrackTags {
                artist: "John Coltrane",
                title,
                album: "Giant Steps",
                track: i as u32 + 1,
            },
            Some(&cover),
        );
    }
    let files = synced(&harness).await;

    let summary = harness.importer.import_selection(&files, None).await.unwrap();
    assert_eq!(summary.imported, 2);

    let all = harness.all_songs().await;
    assert_eq!(all.len(), 2);
    assert!(all[0].cover_art_path.is_some());
    assert_eq!(all[0].cover_art_path, all[1].cover_art_path);
    assert_eq!(harness.stored_covers().len(), 1);
}

#[tokio::test]
async fn test_unreadable_file_fails_the_run() {
    let harness = Harness::new().await;
    harness.add_track("a.wav", 1);
    harness.add_file("b.wav", b"not audio at all");
    let files = synced(&harness).await;
    assert_eq!(relative_paths(&files), vec!["a.wav", "b.wav"]);

    let err = harness
        .importer
        .import_selection(&files, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Metadata { .. }));

    assert!(matches!(
        harness.importer.state(),
        ImportState::Failed { .. }
    ));

    let source = sources::get_by_id(&harness.pool, harness.source.id)
        .await
        .unwrap()
        .unwrap();
    let recorded = source.sync_error.expect("No sync error recorded");
    assert!(recorded.contains("b.wav"));

    // Songs written before the failure are kept
    let all = harness.all_songs().await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "a");
    assert_eq!(harness.access.open_handles(), 0);
}

#[tokio::test]
async fn test_sync_during_import_keeps_the_import_going() {
    let harness = Harness::new().await;
    for i in 0..60u8 {
        harness.add_track(&format!("bulk/track-{i:03}.wav"), i);
    }
    let files = synced(&harness).await;

    let importer = Arc::clone(&harness.importer);
    let (tx, mut rx) = mpsc::channel(1);
    let run = tokio::spawn(async move { importer.import_selection(&files, Some(tx)).await });
    rx.recv().await.expect("No progress reported");

    // The sync opens and releases its own handle on the same source
    harness
        .indexer
        .sync_source(harness.source.id)
        .await
        .unwrap();

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.outcome, ImportOutcome::Completed);
    assert_eq!(summary.imported, 60);
    assert_eq!(summary.unresolved, 0);
    assert_eq!(harness.access.open_handles(), 0);
    assert_eq!(harness.resolver.open_scope_count(), 0);
}
