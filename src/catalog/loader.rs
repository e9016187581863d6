//! Catalog loading with an optional SQLite cache in front of the service.

use std::sync::{Arc, Mutex};

use super::{SchemaCatalog, SchemaLoadResult, SchemaService};
use crate::cache::CatalogCache;

/// Loads catalogs through a [`SchemaService`], consulting a cache first.
///
/// Cache failures never fail a load; they are logged and the service is
/// asked directly.
pub struct CatalogLoader {
    service: Arc<dyn SchemaService>,
    cache: Option<Mutex<CatalogCache>>,
}

impl CatalogLoader {
    pub fn new(service: Arc<dyn SchemaService>) -> Self {
        Self {
            service,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: CatalogCache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    /// Load the catalog for a connection.
    pub async fn load(&self, connection_id: &str) -> SchemaLoadResult<SchemaCatalog> {
        if let Some(catalog) = self.cached(connection_id) {
            tracing::debug!(connection = %connection_id, fields = catalog.len(), "catalog cache hit");
            return Ok(catalog);
        }
        self.fetch(connection_id).await
    }

    /// Bypass and replace the cached catalog.
    pub async fn refresh(&self, connection_id: &str) -> SchemaLoadResult<SchemaCatalog> {
        if let Some(cache) = &self.cache {
            if let Ok(cache) = cache.lock() {
                if let Err(e) = cache.invalidate(connection_id) {
                    tracing::warn!(connection = %connection_id, error = %e, "catalog cache invalidate failed");
                }
            }
        }
        self.fetch(connection_id).await
    }

    async fn fetch(&self, connection_id: &str) -> SchemaLoadResult<SchemaCatalog> {
        let fields = self.service.describe(connection_id).await?;
        let catalog = SchemaCatalog::new(connection_id, fields)?;
        tracing::info!(
            connection = %connection_id,
            tables = catalog.tables().len(),
            fields = catalog.len(),
            "catalog loaded"
        );

        if let Some(cache) = &self.cache {
            if let Ok(cache) = cache.lock() {
                if let Err(e) = cache.put_catalog(&catalog) {
                    tracing::warn!(connection = %connection_id, error = %e, "catalog cache write failed");
                }
            }
        }
        Ok(catalog)
    }

    fn cached(&self, connection_id: &str) -> Option<SchemaCatalog> {
        let cache = self.cache.as_ref()?.lock().ok()?;
        match cache.get_catalog(connection_id) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(connection = %connection_id, error = %e, "catalog cache read failed");
                None
            }
        }
    }
}
