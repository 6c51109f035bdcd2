pub mod blobstore;
pub mod cli;
pub mod config;
pub mod db;
pub mod entity;
pub mod logging;
pub mod migration;
pub mod processor;
pub mod reconcile;
pub mod style;
pub mod upload;
#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;

use fieldfiles_shared::AttachmentError;
use sea_orm::DatabaseConnection;

use crate::{
    blobstore::Storages,
    cli::{db_path_default, CliOpts},
    config::{AppConfig, UploadConfig},
    db::AttachmentStore,
    processor::{ImageProcessor, RasterProcessor},
    reconcile::Reconciler,
    style::StyleResolver,
    upload::UploadPipeline,
};

/// Everything a command needs, wired to one database and one set of
/// storage backends.
#[derive(Clone)]
pub struct AppState {
    pub store: AttachmentStore,
    pub reconciler: Reconciler,
    pub uploads: UploadPipeline,
    pub styles: StyleResolver,
    pub storages: Storages,
}

impl AppState {
    pub async fn new(cli: &CliOpts, config: AppConfig) -> Result<Self, AttachmentError> {
        let db_path: PathBuf = cli.db_path.clone().unwrap_or(db_path_default().into());
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conn = db::start_db(Some(&db_path)).await?;
        let storages = config.storages()?;
        Ok(Self::build(
            conn,
            storages,
            Arc::new(RasterProcessor::default()),
            config.images,
        ))
    }

    pub fn build(
        conn: DatabaseConnection,
        storages: Storages,
        processor: Arc<dyn ImageProcessor>,
        upload_config: UploadConfig,
    ) -> Self {
        let store = AttachmentStore::new(conn);
        Self {
            reconciler: Reconciler::new(store.clone()),
            uploads: UploadPipeline::new(
                store.clone(),
                storages.clone(),
                processor.clone(),
                upload_config.clone(),
            ),
            styles: StyleResolver::new(store.clone(), storages.clone(), processor, upload_config),
            storages,
            store,
        }
    }

    #[cfg(test)]
    pub async fn test() -> Self {
        let db = db::start_db(None).await.expect("Failed to start test DB");
        let storages = Storages::new(Arc::new(blobstore::MemoryStorage::new(
            "memory",
            "http://localhost/uploads",
        )));
        Self::build(
            db,
            storages,
            Arc::new(RasterProcessor::default()),
            UploadConfig::default(),
        )
    }
}
