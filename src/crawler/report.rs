//! Applies crawl outcomes to the cache and the retry tracker

use crate::crawler::types::CrawlResult;
use crate::state::{Clock, RetryTracker};
use crate::storage::{CatalogStore, PutOutcome, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Running totals since the manager was created
#[derive(Debug, Default)]
pub struct CrawlCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    stale_discarded: AtomicU64,
    storage_errors: AtomicU64,
    cycles_run: AtomicU64,
    cycles_skipped: AtomicU64,
}

/// Point-in-time copy of [`CrawlCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub succeeded: u64,
    pub failed: u64,
    pub stale_discarded: u64,
    pub storage_errors: u64,
    pub cycles_run: u64,
    pub cycles_skipped: u64,
    /// Targets dropped by a full work queue
    pub queue_rejected: u64,
}

impl CrawlCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            queue_rejected: 0,
        }
    }

    pub(crate) fn cycle_run(&self) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cycle_skipped(&self) {
        self.cycles_skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Hands each crawl result to the cache and the retry tracker
///
/// Results for the same node are applied one at a time, so the cache write
/// and the tracker update of one result are never interleaved with those of
/// another result for that node.
///
/// Cache writes may block (the SQLite backend does file I/O), so they run on
/// the blocking thread pool.
pub struct OutcomeReporter {
    store: Arc<dyn CatalogStore>,
    tracker: Arc<RetryTracker>,
    counters: Arc<CrawlCounters>,
    clock: Arc<dyn Clock>,
    node_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OutcomeReporter {
    /// Creates the reporter
    ///
    /// # Arguments
    ///
    /// * `store` - Cache receiving successful catalogs
    /// * `tracker` - Failure state updated by every outcome
    /// * `counters` - Totals shared with the manager
    /// * `clock` - Start of suspension windows, read when a failure is recorded
    pub fn new(
        store: Arc<dyn CatalogStore>,
        tracker: Arc<RetryTracker>,
        counters: Arc<CrawlCounters>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            tracker,
            counters,
            clock,
            node_locks: DashMap::new(),
        }
    }

    async fn put(
        &self,
        node_id: &str,
        payload: serde_json::Value,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<PutOutcome> {
        let store = Arc::clone(&self.store);
        let node_id = node_id.to_string();
        tokio::task::spawn_blocking(move || store.put(&node_id, payload, fetched_at))
            .await
            .unwrap_or_else(|e| {
                Err(StorageError::Database(format!(
                    "cache write aborted: {}",
                    e
                )))
            })
    }

    fn node_lock(&self, node_id: &str) -> Arc<Mutex<()>> {
        self.node_locks
            .entry(node_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Records one crawl result
    ///
    /// A failed cache write is logged and counted; the node's success is still
    /// recorded, and the next successful crawl writes the entry again.
    pub async fn report(&self, result: CrawlResult) {
        let lock = self.node_lock(result.node_id());
        let _guard = lock.lock().await;

        match result {
            CrawlResult::Success {
                node_id,
                payload,
                fetched_at,
            } => {
                match self.put(&node_id, payload, fetched_at).await {
                    Ok(PutOutcome::Stale) => {
                        self.counters.stale_discarded.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(node_id = %node_id, "Discarded out-of-date catalog");
                    }
                    Ok(outcome) => {
                        tracing::debug!(node_id = %node_id, ?outcome, "Cached catalog");
                    }
                    Err(e) => {
                        self.counters.storage_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(node_id = %node_id, "Failed to cache catalog: {}", e);
                    }
                }
                self.tracker.record_success(&node_id, fetched_at);
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            CrawlResult::Failure {
                node_id,
                kind,
                message,
                fetched_at: _,
            } => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                // The window starts now, not when the failed fetch started
                let recorded_at = self.clock.now();
                match self
                    .tracker
                    .record_failure(&node_id, kind, &message, recorded_at)
                {
                    Some(until) => tracing::warn!(
                        node_id = %node_id,
                        kind = %kind,
                        "Node suspended until {}: {}",
                        until.to_rfc3339(),
                        message
                    ),
                    None => tracing::info!(
                        node_id = %node_id,
                        kind = %kind,
                        "Crawl failed: {}",
                        message
                    ),
                }
            }
        }
    }

    /// Drops the per-node lock of a node that left the directory
    pub fn forget(&self, node_id: &str) {
        self.node_locks.remove(node_id);
    }
}
