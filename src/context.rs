/// Application context and dependency injection
use crate::{
    blob_store::{BlobStore, BlobStoreConfig},
    config::ServerConfig,
    db,
    error::DepotResult,
    staging::StagingArea,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub blob_store: Arc<BlobStore>,
    pub staging: Arc<StagingArea>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> DepotResult<Self> {
        // Validate configuration
        config.validate()?;

        // Open the shared pool and bring the schema up to date
        let db = db::open(
            &config.storage.database_path(),
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                ..Default::default()
            },
        )
        .await?;

        let blob_store = Arc::new(BlobStore::new(
            BlobStoreConfig {
                chunk_size: config.storage.chunk_size,
            },
            db.clone(),
        )?);

        let staging = Arc::new(StagingArea::new(config.staging.directory.clone()));
        staging.ensure().await?;

        tracing::info!(
            database = ?config.storage.database_path(),
            chunk_size = config.storage.chunk_size,
            upload_mode = ?config.staging.mode,
            "store ready"
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            blob_store,
            staging,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }

    /// Release the shared store handle
    pub async fn close(&self) {
        self.db.close().await;
        tracing::info!("store connections closed");
    }
}
