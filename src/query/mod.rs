//! Read-only access to cached catalogs
//!
//! Readers never trigger network activity and never write to the cache; they
//! only see what the crawlers last stored.

use crate::storage::{CachedCatalogEntry, CatalogStore, StorageResult};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Equality test on one property of a catalog, addressed by JSON pointer
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub pointer: String,
    pub value: Value,
}

impl Criterion {
    /// `pointer` follows RFC 6901, e.g. `/dcat:keyword/0`
    pub fn new(pointer: impl Into<String>, value: Value) -> Self {
        Self {
            pointer: pointer.into(),
            value,
        }
    }

    fn matches(&self, payload: &Value) -> bool {
        payload.pointer(&self.pointer) == Some(&self.value)
    }
}

/// Filter over cached entries; all set conditions must hold
#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    node_ids: Option<HashSet<String>>,
    updated_since: Option<DateTime<Utc>>,
    exclude_expired: bool,
    criteria: Vec<Criterion>,
}

impl CatalogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only entries of these nodes
    pub fn nodes<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_ids = Some(node_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Only entries fetched at or after `since`
    pub fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    /// Skip entries marked by the staleness sweep
    pub fn exclude_expired(mut self) -> Self {
        self.exclude_expired = true;
        self
    }

    pub fn criterion(mut self, criterion: Criterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    pub fn matches(&self, entry: &CachedCatalogEntry) -> bool {
        if let Some(ids) = &self.node_ids {
            if !ids.contains(&entry.node_id) {
                return false;
            }
        }
        if let Some(since) = self.updated_since {
            if entry.last_updated < since {
                return false;
            }
        }
        if self.exclude_expired && entry.expired {
            return false;
        }
        self.criteria.iter().all(|c| c.matches(&entry.payload))
    }
}

/// Read-only facade over the catalog cache
#[derive(Clone)]
pub struct CatalogQueryService {
    store: Arc<dyn CatalogStore>,
}

impl CatalogQueryService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, node_id: &str) -> StorageResult<Option<CachedCatalogEntry>> {
        self.store.get(node_id)
    }

    pub fn snapshot(&self) -> StorageResult<Vec<CachedCatalogEntry>> {
        self.store.snapshot()
    }

    /// Entries matching `filter`, ordered by node id
    pub fn query(&self, filter: &CatalogFilter) -> StorageResult<Vec<CachedCatalogEntry>> {
        Ok(self
            .store
            .snapshot()?
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect())
    }
}
