//! `CatalogProvider` - builds the configured catalog backend.

use std::sync::Arc;

use log::info;

use common_config::CatalogConfig;
use common_error::ShardlineResult;

use crate::catalog::PartitionCatalog;
use crate::fs::FsCatalog;
use crate::memory::MemoryCatalog;

/// Single entry point for obtaining a catalog handle.
///
/// The handle is created once, shared through `Arc`, and released when the
/// last clone is dropped.
pub struct CatalogProvider;

impl CatalogProvider {
    /// Open the backend selected by `config`.
    pub async fn open(config: &CatalogConfig) -> ShardlineResult<Arc<dyn PartitionCatalog>> {
        let catalog: Arc<dyn PartitionCatalog> = match config {
            CatalogConfig::Memory => Arc::new(MemoryCatalog::new()),
            CatalogConfig::Fs { path } => Arc::new(FsCatalog::open(path.clone()).await?),
        };
        info!("catalog: opened {} backend", catalog.backend());
        Ok(catalog)
    }
}
