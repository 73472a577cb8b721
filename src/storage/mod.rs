//! Catalog cache storage
//!
//! This module holds the latest successfully fetched catalog per node. Two
//! backends are provided:
//! - an in-memory map for short-lived or embedded deployments
//! - SQLite, so a restarted crawler serves its last known catalogs at once

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::InMemoryCatalogStore;
pub use sqlite::SqliteCatalogStore;
pub use traits::{CatalogStore, PutOutcome, StorageError, StorageResult};

use crate::config::{CacheBackend, CacheConfig};
use crate::crawler::CatalogPayload;
use crate::CrawlerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// A cached catalog and when it was fetched
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedCatalogEntry {
    pub node_id: String,
    pub payload: CatalogPayload,
    pub last_updated: DateTime<Utc>,

    /// Set by the staleness sweep; cleared by the next successful put
    pub expired: bool,
}

impl CachedCatalogEntry {
    pub fn new(
        node_id: impl Into<String>,
        payload: CatalogPayload,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            payload,
            last_updated,
            expired: false,
        }
    }
}

/// Opens the cache backend selected by the configuration
///
/// # Returns
///
/// * `Ok(Arc<dyn CatalogStore>)` - Ready to use store
/// * `Err(CrawlerError)` - The database could not be opened
pub fn open_store(config: &CacheConfig) -> Result<Arc<dyn CatalogStore>, CrawlerError> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(InMemoryCatalogStore::new())),
        CacheBackend::Sqlite => {
            let path = config.database_path.as_deref().ok_or_else(|| {
                crate::ConfigError::Validation(
                    "database_path is required for the sqlite cache backend".to_string(),
                )
            })?;
            Ok(Arc::new(SqliteCatalogStore::new(Path::new(path))?))
        }
    }
}

/// Decides what a put does given the entry currently stored for the node
///
/// Older results never overwrite newer ones. An equal timestamp with an
/// identical payload on a live entry changes nothing.
pub(crate) fn decide_put(
    existing: Option<(&CatalogPayload, DateTime<Utc>, bool)>,
    payload: &CatalogPayload,
    fetched_at: DateTime<Utc>,
) -> PutOutcome {
    match existing {
        None => PutOutcome::Inserted,
        Some((_, last_updated, _)) if fetched_at < last_updated => PutOutcome::Stale,
        Some((current, last_updated, expired))
            if fetched_at == last_updated && current == payload && !expired =>
        {
            PutOutcome::Unchanged
        }
        Some(_) => PutOutcome::Replaced,
    }
}
