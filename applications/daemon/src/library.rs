/// Wiring of the storage, access and importer layers for one data directory
use crate::config::CadenceConfig;
use crate::error::{DaemonError, Result};
use cadence_access::{AccessScopeManager, FileLocatorStore, FsLocatorResolver};
use cadence_core::{PathSearchResult, Song, Source, SourcePath};
use cadence_importer::copy::BackgroundCopyService;
use cadence_importer::indexer::SourceIndexer;
use cadence_importer::registry::SourceRegistry;
use cadence_importer::MediaImporter;
use cadence_storage::{songs, source_paths, Page, PageRequest};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct Library {
    pub pool: SqlitePool,
    pub user_id: String,
    pub access: Arc<AccessScopeManager>,
    pub registry: SourceRegistry,
    pub indexer: SourceIndexer,
    pub importer: Arc<MediaImporter>,
    pub copier: Arc<BackgroundCopyService>,
}

impl Library {
    pub async fn open(config: &CadenceConfig) -> Result<Self> {
        let pool = cadence_storage::open_library(&config.storage.data_dir).await?;
        tracing::info!(
            "Library database at {}",
            cadence_storage::database_path(&config.storage.data_dir).display()
        );

        let resolver = Arc::new(FsLocatorResolver::new(config.locator_ttl()));
        let store = Arc::new(FileLocatorStore::new(config.locator_store_path()));
        let access = Arc::new(AccessScopeManager::new(
            pool.clone(),
            resolver.clone(),
            store,
        ));

        let library_dir = config.library_dir();
        tokio::fs::create_dir_all(&library_dir).await?;

        Ok(Self {
            registry: SourceRegistry::new(pool.clone(), access.clone()),
            indexer: SourceIndexer::new(pool.clone(), access.clone())
                .batch_size(config.index.batch_size),
            importer: Arc::new(MediaImporter::new(
                pool.clone(),
                access.clone(),
                &library_dir,
            )),
            copier: Arc::new(BackgroundCopyService::new(
                pool.clone(),
                resolver,
                &library_dir,
                config.copy.to_copy_config(),
            )),
            user_id: config.library.user_id.clone(),
            access,
            pool,
        })
    }

    pub async fn current_source(&self) -> Result<Source> {
        self.registry
            .get_current(&self.user_id)
            .await?
            .ok_or_else(|| DaemonError::NoCurrentSource(self.user_id.clone()))
    }

    /// Search the current source's path index, best match first
    pub async fn search_paths(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<(PathSearchResult, SourcePath)>> {
        let source = self.current_source().await?;
        let hits = source_paths::search(&self.pool, source.id, query, limit).await?;

        let ids: Vec<String> = hits.iter().map(|hit| hit.path_id.clone()).collect();
        let rows = source_paths::get_by_path_ids(&self.pool, source.id, &ids).await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                rows.iter()
                    .find(|row| row.path_id == hit.path_id)
                    .cloned()
                    .map(|row| (hit, row))
            })
            .collect())
    }

    /// Entries selected for import: the whole source, or the search hits for `query`
    pub async fn selection(&self, query: Option<&str>) -> Result<Vec<SourcePath>> {
        let source = self.current_source().await?;
        match query {
            Some(query) => Ok(self
                .search_paths(query, u32::MAX)
                .await?
                .into_iter()
                .map(|(_, row)| row)
                .collect()),
            None => Ok(source_paths::get_by_parent_id(&self.pool, source.id, &source.path_id).await?),
        }
    }

    pub async fn search_songs(&self, query: &str, request: PageRequest) -> Result<Page<Song>> {
        Ok(songs::search(&self.pool, query, request).await?)
    }
}
