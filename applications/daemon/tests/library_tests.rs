//! End-to-end tests over a fully wired library

use cadence_core::{FileState, SourceType};
use cadence_daemon::{CadenceConfig, DaemonError, Library};
use cadence_storage::PageRequest;
use std::path::Path;
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> CadenceConfig {
    let mut config = CadenceConfig::default();
    config.storage.data_dir = dir.path().join("data");
    config.copy.backoff_base_secs = 0;
    config.copy.backoff_max_secs = 0;
    config
}

/// A short silent mono WAV; `seed` only varies the length so contents differ
fn wav(seed: u8) -> Vec<u8> {
    let data_len = 32 + u32::from(seed) * 2;
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&8000u32.to_le_bytes());
    bytes.extend_from_slice(&16000u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(bytes.len() + data_len as usize, 0);
    bytes
}

fn write_track(root: &Path, relative: &str, contents: &[u8]) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

#[tokio::test]
async fn test_register_sync_import_copy() {
    let dir = tempfile::tempdir().unwrap();
    let music = dir.path().join("music");
    write_track(&music, "Blue Train.wav", &wav(1));
    write_track(&music, "Giant Steps/Naima.wav", &wav(2));
    write_track(&music, "Giant Steps/Mr. P.C..wav", &wav(3));
    write_track(&music, "Giant Steps/booklet.pdf", b"pdf");

    let config = test_config(&dir);
    let library = Library::open(&config).await.unwrap();

    let source = library
        .registry
        .register_root(&library.user_id, &music, SourceType::Folder)
        .await
        .unwrap();
    let report = library.indexer.sync_current(&library.user_id).await.unwrap();
    assert_eq!(report.source_id, source.id);
    assert_eq!(report.audio_files, 3);
    assert_eq!(report.other_files, 1);

    let hits = library.search_paths("naima", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].1.relative_path, "Giant Steps/Naima.wav");

    let selection = library.selection(None).await.unwrap();
    assert_eq!(selection.len(), 2);

    let summary = library
        .importer
        .import_selection(&selection, None)
        .await
        .unwrap();
    assert_eq!(summary.imported, 3);

    let page = library
        .search_songs("naima", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Naima");

    let report = library.copier.run_cycle().await.unwrap();
    assert_eq!(report.copied, 3);

    let page = library
        .search_songs("naima", PageRequest::default())
        .await
        .unwrap();
    let song = &page.items[0];
    assert_eq!(song.file_state, FileState::Copied);
    let local = config.library_dir().join(song.local_file_path.as_ref().unwrap());
    assert_eq!(std::fs::read(local).unwrap(), wav(2));
}

#[tokio::test]
async fn test_root_locator_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let music = dir.path().join("music");
    write_track(&music, "a.wav", &wav(1));
    let config = test_config(&dir);

    {
        let library = Library::open(&config).await.unwrap();
        library
            .registry
            .register_root(&library.user_id, &music, SourceType::Volume)
            .await
            .unwrap();
    }

    let library = Library::open(&config).await.unwrap();
    let report = library.indexer.sync_current(&library.user_id).await.unwrap();
    assert_eq!(report.audio_files, 1);
    assert!(config.locator_store_path().exists());
}

#[tokio::test]
async fn test_commands_without_source_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let library = Library::open(&test_config(&dir)).await.unwrap();

    let err = library.selection(None).await.unwrap_err();
    assert!(matches!(err, DaemonError::NoCurrentSource(_)));

    let err = library.search_paths("anything", 5).await.unwrap_err();
    assert!(matches!(err, DaemonError::NoCurrentSource(_)));
}

#[tokio::test]
async fn test_import_by_query_selects_matches_only() {
    let dir = tempfile::tempdir().unwrap();
    let music = dir.path().join("music");
    write_track(&music, "Coltrane/Naima.wav", &wav(1));
    write_track(&music, "Davis/So What.wav", &wav(2));

    let library = Library::open(&test_config(&dir)).await.unwrap();
    library
        .registry
        .register_root(&library.user_id, &music, SourceType::Folder)
        .await
        .unwrap();
    library.indexer.sync_current(&library.user_id).await.unwrap();

    let selection = library.selection(Some("coltrane")).await.unwrap();
    let summary = library
        .importer
        .import_selection(&selection, None)
        .await
        .unwrap();

    assert_eq!(summary.imported, 1);
    let page = library
        .search_songs("naima", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}
