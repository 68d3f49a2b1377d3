//! Wires storage, persistence, processors and the worker pool from configuration.

use anyhow::{Context, Result};
use mediafiles_core::Config;
use mediafiles_db::{setup_database, InMemoryMediaRepository, MediaRepository, PgMediaRepository};
use mediafiles_processing::{ProcessingSettings, ProcessorRegistry};
use mediafiles_storage::{create_storage, ArtifactStore};
use mediafiles_worker::{
    MediaService, ProcessingCoordinator, ProcessingExecutor, WorkerPool, WorkerPoolConfig,
};
use std::sync::Arc;

/// Everything a binary needs to accept uploads
pub struct Runtime {
    pub service: MediaService,
    pub store: Arc<dyn ArtifactStore>,
    pub repository: Arc<dyn MediaRepository>,
    pub worker_pool: Option<Arc<WorkerPool>>,
}

impl Runtime {
    /// True when records are kept in PostgreSQL
    pub fn is_persistent(&self) -> bool {
        self.repository.backend_name() == "postgres"
    }

    pub async fn shutdown(&self) {
        if let Some(pool) = &self.worker_pool {
            pool.shutdown().await;
        }
    }
}

async fn repository(config: &Config) -> Result<Arc<dyn MediaRepository>> {
    if config.database_url().is_some() {
        let pool = setup_database(config).await?;
        Ok(Arc::new(PgMediaRepository::new(pool)))
    } else {
        tracing::warn!("DATABASE_URL not set, media records are kept in memory");
        Ok(Arc::new(InMemoryMediaRepository::new()))
    }
}

/// Build the pipeline. Must be called inside a tokio runtime when the worker
/// pool is enabled.
pub async fn bootstrap(config: &Config) -> Result<Runtime> {
    let store = create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    let repository = repository(config).await?;

    let registry = Arc::new(ProcessorRegistry::new(ProcessingSettings::from_config(
        config,
    )));
    let executor = ProcessingExecutor::new(registry, store.clone(), repository.clone());

    let mut coordinator = ProcessingCoordinator::new(executor.clone());
    let worker_pool = if config.worker_enabled {
        let pool = Arc::new(WorkerPool::start(
            executor,
            WorkerPoolConfig::from_config(config),
        ));
        coordinator = coordinator.with_worker(pool.clone());
        Some(pool)
    } else {
        tracing::info!("Worker pool disabled, processing runs inline");
        None
    };

    tracing::info!(
        storage_backend = %config.storage_backend(),
        persistence = repository.backend_name(),
        worker_enabled = config.worker_enabled,
        "Media pipeline ready"
    );

    Ok(Runtime {
        service: MediaService::new(store.clone(), repository.clone(), coordinator),
        store,
        repository,
        worker_pool,
    })
}
