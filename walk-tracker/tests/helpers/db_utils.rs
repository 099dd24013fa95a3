//! Store and pipeline fixtures backed by a temporary directory

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use walk_common::events::EventBus;
use walk_tracker::services::{CheckpointStore, DirectoryPhotoStorage, PhotoSearchClient, PhotoStorage};
use walk_tracker::workflow::PipelineCoordinator;
use walk_tracker::StageError;

use super::fakes::{FakeFetcher, ScriptedSearchClient};

/// Create a checkpoint store on a fresh database
///
/// Returns (TempDir, CheckpointStore) - TempDir must be kept alive for duration of test
pub async fn create_test_store() -> Result<(TempDir, CheckpointStore)> {
    let temp_dir = TempDir::new()?;
    let pool = walk_tracker::db::init_database_pool(&temp_dir.path().join("walk.db")).await?;
    Ok((temp_dir, CheckpointStore::new(pool)))
}

/// A coordinator wired to scripted fakes and a real photo directory
pub struct TestPipeline {
    pub temp_dir: TempDir,
    pub store: CheckpointStore,
    pub event_bus: EventBus,
    pub search: Arc<ScriptedSearchClient>,
    pub fetcher: Arc<FakeFetcher>,
    pub photos_dir: PathBuf,
    pub pipeline: Arc<PipelineCoordinator>,
}

impl TestPipeline {
    pub async fn new() -> Self {
        Self::build(ScriptedSearchClient::new(), FakeFetcher::new(), None).await
    }

    pub async fn with_search(search: ScriptedSearchClient) -> Self {
        Self::build(search, FakeFetcher::new(), None).await
    }

    pub async fn with_fakes(search: ScriptedSearchClient, fetcher: FakeFetcher) -> Self {
        Self::build(search, fetcher, None).await
    }

    pub async fn with_storage(storage: Arc<dyn PhotoStorage>) -> Self {
        Self::build(ScriptedSearchClient::new(), FakeFetcher::new(), Some(storage)).await
    }

    /// Pipeline whose search stage cannot run
    pub async fn without_search() -> Self {
        let mut harness = Self::new().await;
        harness.pipeline = Arc::new(PipelineCoordinator::new(
            harness.store.clone(),
            harness.event_bus.clone(),
            Err(StageError::Configuration("Flickr API key is not configured".to_string())),
            harness.fetcher.clone(),
            Arc::new(DirectoryPhotoStorage::new(harness.photos_dir.clone())),
        ));
        harness
    }

    async fn build(
        search: ScriptedSearchClient,
        fetcher: FakeFetcher,
        storage: Option<Arc<dyn PhotoStorage>>,
    ) -> Self {
        let (temp_dir, store) = create_test_store().await.unwrap();
        let photos_dir = temp_dir.path().join("photos");
        std::fs::create_dir_all(&photos_dir).unwrap();

        let event_bus = EventBus::new(256);
        let search = Arc::new(search);
        let fetcher = Arc::new(fetcher);
        let storage =
            storage.unwrap_or_else(|| Arc::new(DirectoryPhotoStorage::new(photos_dir.clone())));

        let pipeline = Arc::new(PipelineCoordinator::new(
            store.clone(),
            event_bus.clone(),
            Ok(search.clone() as Arc<dyn PhotoSearchClient>),
            fetcher.clone(),
            storage,
        ));

        Self {
            temp_dir,
            store,
            event_bus,
            search,
            fetcher,
            photos_dir,
            pipeline,
        }
    }
}
