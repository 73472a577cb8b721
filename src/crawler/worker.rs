//! Crawler worker
//!
//! A crawler pulls targets from the shared work queue, fetches them through the
//! protocol adapter registered for the target's protocol and reports every
//! outcome. Workers never exit on a fetch error; they stop when the queue is
//! closed or shutdown is requested.

use crate::crawler::queue::WorkQueue;
use crate::crawler::registry::AdapterRegistry;
use crate::crawler::report::OutcomeReporter;
use crate::crawler::types::{CrawlResult, CrawlTarget, FetchErrorKind};
use crate::state::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Crawler {
    id: String,
    queue: Arc<WorkQueue>,
    registry: Arc<AdapterRegistry>,
    reporter: Arc<OutcomeReporter>,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    shutdown: CancellationToken,
}

impl Crawler {
    /// Creates the crawler with the given pool index
    ///
    /// # Arguments
    ///
    /// * `index` - Position in the pool, used for the `crawler-<n>` id
    /// * `queue` - Work queue shared by the pool
    /// * `registry` - Adapters to resolve target protocols with
    /// * `reporter` - Receives every crawl outcome
    /// * `clock` - Timestamps crawl results
    /// * `fetch_timeout` - Upper bound on a single fetch
    /// * `shutdown` - Cancelled when the manager stops
    pub fn new(
        index: usize,
        queue: Arc<WorkQueue>,
        registry: Arc<AdapterRegistry>,
        reporter: Arc<OutcomeReporter>,
        clock: Arc<dyn Clock>,
        fetch_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: format!("crawler-{}", index),
            queue,
            registry,
            reporter,
            clock,
            fetch_timeout,
            shutdown,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Processes targets until the queue is closed or shutdown is requested
    pub async fn run(self) {
        tracing::debug!(crawler = %self.id, "Crawler started");
        let mut processed: u64 = 0;

        while let Some(target) = self.queue.pop().await {
            let _done = self.queue.completion();

            match self.crawl(&target).await {
                Some(result) => {
                    self.reporter.report(result).await;
                    processed += 1;
                }
                None => {
                    tracing::debug!(
                        crawler = %self.id,
                        node_id = %target.node_id,
                        "Crawl abandoned on shutdown"
                    );
                    break;
                }
            }
        }

        tracing::debug!(crawler = %self.id, processed, "Crawler stopped");
    }

    /// Crawls one target
    ///
    /// The result is timestamped when the fetch starts, so a slow response
    /// never looks newer than one requested after it.
    ///
    /// # Returns
    ///
    /// * `Some(CrawlResult)` - The outcome to report
    /// * `None` - Shutdown interrupted the fetch; nothing is recorded
    pub async fn crawl(&self, target: &CrawlTarget) -> Option<CrawlResult> {
        let started_at = self.clock.now();

        let adapter = match self.registry.resolve(&target.protocol) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::warn!(crawler = %self.id, node_id = %target.node_id, "{}", e);
                return Some(CrawlResult::Failure {
                    node_id: target.node_id.clone(),
                    kind: FetchErrorKind::UnsupportedProtocol,
                    message: e.to_string(),
                    fetched_at: started_at,
                });
            }
        };

        tracing::debug!(
            crawler = %self.id,
            node_id = %target.node_id,
            protocol = %target.protocol,
            "Fetching catalog"
        );

        let fetch = tokio::time::timeout(
            self.fetch_timeout,
            adapter.fetch(target, self.fetch_timeout),
        );
        let outcome = tokio::select! {
            _ = self.shutdown.cancelled() => return None,
            outcome = fetch => outcome,
        };

        Some(match outcome {
            Ok(result) => CrawlResult::from_fetch(target, result, started_at),
            Err(_) => CrawlResult::Failure {
                node_id: target.node_id.clone(),
                kind: FetchErrorKind::Timeout,
                message: format!("Fetch exceeded {}ms", self.fetch_timeout.as_millis()),
                fetched_at: started_at,
            },
        })
    }
}
