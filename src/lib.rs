// Public modules
pub mod config;
pub mod domains;
pub mod errors;

pub use config::{ExtractConfig, StorageBackend};
pub use domains::{ExtractService, QueryWindow, RunSummary};
pub use errors::{ExtractError, ExtractResult};

use std::sync::Arc;

use domains::storage::{LocalObjectStore, ObjectStore, S3ObjectStore};

/// Object store selected by the config's storage backend
pub async fn object_store_for(config: &ExtractConfig) -> Arc<dyn ObjectStore> {
    match config.storage_backend {
        StorageBackend::S3 => Arc::new(S3ObjectStore::from_env(&config.bucket).await),
        StorageBackend::Local => Arc::new(LocalObjectStore::new(&config.bucket)),
    }
}

/// Run one extraction against the real contracts API.
/// `day` overrides the config's days-back offset.
pub async fn run_extraction(config: ExtractConfig, day: Option<QueryWindow>) -> ExtractResult<RunSummary> {
    config.validate()?;
    let store = object_store_for(&config).await;
    let service = ExtractService::with_socrata(config, store)?;

    match day {
        Some(window) => service.run_for(window).await,
        None => service.run().await,
    }
}
