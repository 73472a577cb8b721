//! Storage traits and error types
//!
//! This module defines the trait interface for catalog cache backends and
//! associated error types.

use crate::crawler::CatalogPayload;
use crate::storage::CachedCatalogEntry;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What a put did to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// First entry for the node
    Inserted,
    /// An older entry was overwritten
    Replaced,
    /// Same timestamp and payload as the stored entry
    Unchanged,
    /// The stored entry is newer, nothing was written
    Stale,
}

impl PutOutcome {
    /// True if the stored entry now reflects the offered payload
    pub fn is_written(&self) -> bool {
        matches!(self, PutOutcome::Inserted | PutOutcome::Replaced)
    }
}

/// Trait for catalog cache backends
///
/// Implementations are shared between crawler workers and readers, so every
/// method takes `&self` and must be safe to call concurrently. Readers always
/// observe a complete entry, never a partially written one.
pub trait CatalogStore: Send + Sync {
    // ===== Writes =====

    /// Stores `payload` for `node_id` unless a newer entry is already cached
    ///
    /// # Arguments
    ///
    /// * `node_id` - Node the catalog belongs to
    /// * `payload` - The fetched catalog
    /// * `fetched_at` - When the catalog was fetched
    fn put(
        &self,
        node_id: &str,
        payload: CatalogPayload,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<PutOutcome>;

    /// Removes the entry of a node, returning whether one existed
    fn remove(&self, node_id: &str) -> StorageResult<bool>;

    // ===== Reads =====

    /// Gets the entry of a single node
    fn get(&self, node_id: &str) -> StorageResult<Option<CachedCatalogEntry>>;

    /// Every cached entry, ordered by node id
    fn snapshot(&self) -> StorageResult<Vec<CachedCatalogEntry>>;

    /// Ids of every cached node, ordered
    fn node_ids(&self) -> StorageResult<Vec<String>> {
        Ok(self.snapshot()?.into_iter().map(|e| e.node_id).collect())
    }

    /// Number of cached entries
    fn len(&self) -> StorageResult<usize>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    // ===== Staleness =====

    /// Marks every entry as expired, returning how many were marked
    fn expire_all(&self) -> StorageResult<usize>;

    /// Deletes entries still marked expired, returning how many were deleted
    fn delete_expired(&self) -> StorageResult<usize>;
}
