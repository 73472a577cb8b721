//! In-memory catalog cache

use crate::crawler::CatalogPayload;
use crate::storage::traits::{CatalogStore, PutOutcome, StorageResult};
use crate::storage::{decide_put, CachedCatalogEntry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Catalog cache held in process memory
///
/// Entries are immutable once stored and shared through `Arc`, so a snapshot
/// is a cheap copy of pointers and never observes a half-written entry.
#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    entries: RwLock<HashMap<String, Arc<CachedCatalogEntry>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CachedCatalogEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<CachedCatalogEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CatalogStore for InMemoryCatalogStore {
    fn put(
        &self,
        node_id: &str,
        payload: CatalogPayload,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<PutOutcome> {
        let mut entries = self.write();

        let outcome = decide_put(
            entries
                .get(node_id)
                .map(|e| (&e.payload, e.last_updated, e.expired)),
            &payload,
            fetched_at,
        );

        if outcome.is_written() {
            entries.insert(
                node_id.to_string(),
                Arc::new(CachedCatalogEntry::new(node_id, payload, fetched_at)),
            );
        }

        Ok(outcome)
    }

    fn remove(&self, node_id: &str) -> StorageResult<bool> {
        Ok(self.write().remove(node_id).is_some())
    }

    fn get(&self, node_id: &str) -> StorageResult<Option<CachedCatalogEntry>> {
        Ok(self.read().get(node_id).map(|e| e.as_ref().clone()))
    }

    fn snapshot(&self) -> StorageResult<Vec<CachedCatalogEntry>> {
        let shared: Vec<Arc<CachedCatalogEntry>> = self.read().values().cloned().collect();
        // Clone the payloads outside the lock
        let mut entries: Vec<_> = shared.iter().map(|e| e.as_ref().clone()).collect();
        entries.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(entries)
    }

    fn node_ids(&self) -> StorageResult<Vec<String>> {
        let mut ids: Vec<_> = self.read().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.read().len())
    }

    fn expire_all(&self) -> StorageResult<usize> {
        let mut entries = self.write();
        for entry in entries.values_mut() {
            Arc::make_mut(entry).expired = true;
        }
        Ok(entries.len())
    }

    fn delete_expired(&self) -> StorageResult<usize> {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired);
        Ok(before - entries.len())
    }
}
