//! Integration tests for the access scope manager
//!
//! Uses a real library database and real directories in a temp dir.

use cadence_access::{
    AccessError, AccessScopeManager, FsLocatorResolver, Locator, LocatorResolver, LocatorStore,
    MemoryLocatorStore,
};
use cadence_core::{Source, SourceType};
use cadence_storage::sources;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _data_dir: TempDir,
    pool: SqlitePool,
    root: TempDir,
    source: Source,
    resolver: Arc<FsLocatorResolver>,
    store: Arc<MemoryLocatorStore>,
    manager: AccessScopeManager,
}

async fn fixture() -> Fixture {
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
    let store = Arc::new(MemoryLocatorStore::new());
    let manager = AccessScopeManager::new(pool.clone(), resolver.clone(), store.clone());

    Fixture {
        _data_dir: data_dir,
        pool,
        root,
        source,
        resolver,
        store,
        manager,
    }
}

#[tokio::test]
async fn test_resolve_without_locator_fails() {
    let fx = fixture().await;

    let result = fx.manager.resolve(fx.source.id).await;
    assert!(matches!(result, Err(AccessError::MissingLocator { .. })));
    assert_eq!(fx.resolver.open_scope_count(), 0);
}

#[tokio::test]
async fn test_unknown_source_fails() {
    let fx = fixture().await;

    let result = fx.manager.resolve(4242).await;
    assert!(matches!(result, Err(AccessError::UnknownSource(4242))));
}

#[tokio::test]
async fn test_repeated_resolve_opens_one_scope() {
    let fx = fixture().await;
    fx.manager
        .remember_root(&fx.source.path_id, fx.root.path())
        .await
        .unwrap();

    let first = fx.manager.resolve(fx.source.id).await.unwrap();
    for _ in 0..10 {
        let again = fx.manager.resolve(fx.source.id).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
    assert_eq!(first.path(), fx.root.path());
    assert_eq!(fx.resolver.open_scope_count(), 1);
    assert_eq!(fx.manager.open_handles(), 1);

    drop(first);
    fx.manager.release(fx.source.id);
    assert_eq!(fx.resolver.open_scope_count(), 0);
    assert_eq!(fx.manager.open_handles(), 0);
}

#[tokio::test]
async fn test_concurrent_first_resolves_open_one_scope() {
    let fx = fixture().await;
    fx.manager
        .remember_root(&fx.source.path_id, fx.root.path())
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(
        fx.manager.resolve(fx.source.id),
        fx.manager.resolve(fx.source.id),
        fx.manager.resolve(fx.source.id),
    );
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
    assert_eq!(fx.resolver.open_scope_count(), 1);

    drop((a, b, c));
    fx.manager.release_all();
    assert_eq!(fx.resolver.open_scope_count(), 0);
}

#[tokio::test]
async fn test_batch_guard_releases_on_drop() {
    let fx = fixture().await;
    fx.manager
        .remember_root(&fx.source.path_id, fx.root.path())
        .await
        .unwrap();

    {
        let batch = fx.manager.batch();
        let handle = batch.resolve(fx.source.id).await.unwrap();
        assert!(handle.path().is_dir());
        assert_eq!(fx.resolver.open_scope_count(), 1);
    }

    assert_eq!(fx.manager.open_handles(), 0);
    assert_eq!(fx.resolver.open_scope_count(), 0);
}

#[tokio::test]
async fn test_stale_locator_is_renewed_and_persisted() {
    let fx = fixture().await;

    // A locator that expired the moment it was issued
    let expired = FsLocatorResolver::new(Duration::ZERO)
        .create(fx.root.path())
        .unwrap();
    fx.store
        .set(&fx.source.path_id, expired.as_bytes())
        .await
        .unwrap();

    let handle = fx.manager.resolve(fx.source.id).await.unwrap();
    assert_eq!(handle.path(), fx.root.path());

    let stored = fx.store.get(&fx.source.path_id).await.unwrap().unwrap();
    assert_ne!(stored, expired.as_bytes());
    let resolved = fx.resolver.resolve(&Locator::from_bytes(stored)).unwrap();
    assert!(!resolved.is_stale);
}

#[tokio::test]
async fn test_removed_root_is_unresolvable() {
    let fx = fixture().await;
    fx.manager
        .remember_root(&fx.source.path_id, fx.root.path())
        .await
        .unwrap();

    let root_path = fx.root.path().to_path_buf();
    fx.root.close().unwrap();

    let result = fx.manager.resolve(fx.source.id).await;
    assert!(matches!(result, Err(AccessError::Unresolvable { path }) if path == root_path));
}

#[tokio::test]
async fn test_forget_root_removes_locator() {
    let fx = fixture().await;
    fx.manager
        .remember_root(&fx.source.path_id, fx.root.path())
        .await
        .unwrap();
    fx.manager.forget_root(&fx.source.path_id).await.unwrap();

    assert!(fx.store.get(&fx.source.path_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_releases_only_its_own_sources() {
    let fx = fixture().await;
    fx.manager
        .remember_root(&fx.source.path_id, fx.root.path())
        .await
        .unwrap();

    let other_root = tempfile::tempdir().unwrap();
    let other_id = cadence_core::identity::path_id(other_root.path());
    let other = sources::register(
        &fx.pool,
        "user-1",
        &other_root.path().to_string_lossy(),
        &other_id,
        SourceType::Folder,
    )
    .await
    .unwrap();
    fx.manager
        .remember_root(&other_id, other_root.path())
        .await
        .unwrap();

    let long_running = fx.manager.batch();
    let held = long_running.resolve(fx.source.id).await.unwrap();

    {
        let short = fx.manager.batch();
        short.resolve(other.id).await.unwrap();
        assert_eq!(fx.resolver.open_scope_count(), 2);
    }

    // The short batch closed its own scope and left the other one cached
    assert_eq!(fx.resolver.open_scope_count(), 1);
    assert_eq!(fx.manager.open_handles(), 1);
    let again = long_running.resolve(fx.source.id).await.unwrap();
    assert!(Arc::ptr_eq(&held, &again));

    drop((held, again));
    drop(long_running);
    assert_eq!(fx.resolver.open_scope_count(), 0);
    assert_eq!(fx.manager.open_handles(), 0);
}

#[tokio::test]
async fn test_released_handle_stays_open_while_held() {
    let fx = fixture().await;
    fx.manager
        .remember_root(&fx.source.path_id, fx.root.path())
        .await
        .unwrap();

    let handle = fx.manager.resolve(fx.source.id).await.unwrap();
    fx.manager.release_all();

    assert_eq!(fx.manager.open_handles(), 0);
    assert_eq!(fx.resolver.open_scope_count(), 1);

    drop(handle);
    assert_eq!(fx.resolver.open_scope_count(), 0);
}
