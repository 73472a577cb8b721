//! Execution manager - crawl cycle orchestration
//!
//! This module owns the lifecycle of the crawl engine:
//! - Starting and stopping the crawler pool
//! - Firing crawl cycles on a fixed-rate timer
//! - Filtering directory nodes into crawl targets
//! - Evicting nodes that left the directory
//! - Sweeping catalogs that were not refreshed during a full cycle

use crate::config::{Config, OverlapPolicy};
use crate::crawler::queue::{PushOutcome, WorkQueue};
use crate::crawler::registry::AdapterRegistry;
use crate::crawler::report::{CounterSnapshot, CrawlCounters, OutcomeReporter};
use crate::crawler::types::CrawlTarget;
use crate::crawler::worker::Crawler;
use crate::directory::{NodeDirectory, TargetNode};
use crate::state::{Clock, RetryPolicy, RetryTracker, SystemClock};
use crate::storage::CatalogStore;
use crate::CrawlerError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Lifecycle state of the execution manager
///
/// Transitions only ever move forward: `Idle -> Running -> Stopping -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Settings of the crawl engine
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub enabled: bool,
    pub worker_pool_size: usize,
    pub cycle_interval: Duration,
    pub initial_delay: Duration,
    pub fetch_timeout: Duration,
    pub queue_capacity: Option<usize>,
    pub overlap_policy: OverlapPolicy,
    pub self_node_id: Option<String>,
    pub evict_unrefreshed: bool,
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.crawler.enabled,
            worker_pool_size: config.crawler.worker_pool_size,
            cycle_interval: config.crawler.cycle_interval(),
            initial_delay: config.crawler.initial_delay(),
            fetch_timeout: config.crawler.fetch_timeout(),
            queue_capacity: config.crawler.queue_capacity(),
            overlap_policy: config.crawler.overlap_policy,
            self_node_id: config.crawler.self_node_id.clone(),
            evict_unrefreshed: config.cache.evict_unrefreshed,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why a cycle did not enqueue anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The manager is not running
    NotRunning,
    /// Crawling is globally disabled, nothing would consume the queue
    Disabled,
    /// Work from an earlier cycle is still queued or in flight
    Overlap { outstanding: usize },
    /// The node directory could not be read
    DirectoryUnavailable(String),
}

/// What one crawl cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Nodes returned by the directory
    pub listed: usize,
    /// Targets accepted by the work queue
    pub enqueued: usize,
    /// Nodes skipped because they are suspended
    pub suspended: usize,
    /// Nodes skipped because they are the local node or list no protocol
    pub filtered: usize,
    /// Targets dropped by a full queue
    pub rejected: usize,
    /// Cache entries removed because their node left the directory
    pub evicted: usize,
    /// Cache entries removed by the staleness sweep
    pub swept: usize,
    /// Set when the cycle was skipped as a whole
    pub skipped: Option<SkipReason>,
}

/// Drives periodic crawl cycles over a pool of crawlers
pub struct ExecutionManager {
    settings: ManagerSettings,
    directory: Arc<dyn NodeDirectory>,
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn CatalogStore>,
    tracker: Arc<RetryTracker>,
    clock: Arc<dyn Clock>,
    queue: Arc<WorkQueue>,
    reporter: Arc<OutcomeReporter>,
    counters: Arc<CrawlCounters>,
    state: Mutex<ManagerState>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ExecutionManager {
    /// Creates an idle manager
    ///
    /// # Arguments
    ///
    /// * `settings` - Pool size, timing and filtering settings
    /// * `policy` - Failure thresholds and suspension cooldowns
    /// * `directory` - Source of nodes to crawl
    /// * `registry` - Adapters, complete before the manager starts
    /// * `store` - Catalog cache written by the crawlers
    pub fn new(
        settings: ManagerSettings,
        policy: RetryPolicy,
        directory: Arc<dyn NodeDirectory>,
        registry: AdapterRegistry,
        store: Arc<dyn CatalogStore>,
    ) -> Self {
        let tracker = Arc::new(RetryTracker::new(policy));
        let counters = Arc::new(CrawlCounters::default());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let reporter = Arc::new(OutcomeReporter::new(
            store.clone(),
            tracker.clone(),
            counters.clone(),
            clock.clone(),
        ));

        Self {
            queue: Arc::new(WorkQueue::new(settings.queue_capacity)),
            settings,
            directory,
            registry: Arc::new(registry),
            store,
            tracker,
            clock,
            reporter,
            counters,
            state: Mutex::new(ManagerState::Idle),
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the clock used for eligibility checks, result timestamps and
    /// suspension windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.reporter = Arc::new(OutcomeReporter::new(
            self.store.clone(),
            self.tracker.clone(),
            self.counters.clone(),
            clock.clone(),
        ));
        self.clock = clock;
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the crawler pool and the cycle timer
    ///
    /// The first cycle fires after the configured initial delay, then once per
    /// cycle interval. With crawling disabled the manager enters `Running`
    /// without spawning anything.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The manager is running
    /// * `Err(CrawlerError)` - Not idle, no adapters, or an empty pool
    pub fn start(self: &Arc<Self>) -> Result<(), CrawlerError> {
        if !self.start_workers()? {
            return Ok(());
        }

        let manager = Arc::clone(self);
        self.lock_handles()
            .push(tokio::spawn(async move { manager.run_timer().await }));

        tracing::info!(
            "Crawling {} every {}s with {} crawlers",
            self.registry.protocols().join(", "),
            self.settings.cycle_interval.as_secs(),
            self.settings.worker_pool_size
        );
        Ok(())
    }

    /// Starts the crawler pool without a cycle timer
    ///
    /// Cycles then only happen when [`ExecutionManager::run_cycle`] is called.
    pub fn start_manual(&self) -> Result<(), CrawlerError> {
        self.start_workers().map(|_| ())
    }

    /// Moves to `Running` and spawns the pool, returning whether crawling is enabled
    fn start_workers(&self) -> Result<bool, CrawlerError> {
        {
            let mut state = self.lock_state();
            if *state != ManagerState::Idle {
                return Err(CrawlerError::InvalidTransition {
                    from: *state,
                    to: ManagerState::Running,
                });
            }
            if self.registry.is_empty() {
                return Err(CrawlerError::EmptyRegistry);
            }
            if self.settings.worker_pool_size == 0 {
                return Err(CrawlerError::InvalidPoolSize(0));
            }
            *state = ManagerState::Running;
        }

        if !self.settings.enabled {
            tracing::warn!("Crawling is globally disabled, no crawlers started");
            return Ok(false);
        }

        let mut handles = self.lock_handles();
        for index in 0..self.settings.worker_pool_size {
            let crawler = Crawler::new(
                index,
                self.queue.clone(),
                self.registry.clone(),
                self.reporter.clone(),
                self.clock.clone(),
                self.settings.fetch_timeout,
                self.shutdown.child_token(),
            );
            handles.push(tokio::spawn(crawler.run()));
        }
        Ok(true)
    }

    async fn run_timer(self: Arc<Self>) {
        let period = self.settings.cycle_interval.max(Duration::from_millis(1));
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.settings.initial_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // A cycle blocked on the directory must not hold up stop()
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.run_cycle() => {}
            }
        }
        tracing::debug!("Cycle timer stopped");
    }

    /// Runs one crawl cycle
    ///
    /// 1. Skips the cycle if earlier work is outstanding and overlap is not allowed
    /// 2. Sweeps catalogs not refreshed since the last cycle, when enabled
    /// 3. Lists the directory and evicts nodes that left it
    /// 4. Enqueues every eligible node with a usable protocol
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        if self.state() != ManagerState::Running {
            report.skipped = Some(SkipReason::NotRunning);
            return report;
        }

        if !self.settings.enabled {
            tracing::debug!("Crawling is disabled, cycle skipped");
            report.skipped = Some(SkipReason::Disabled);
            return report;
        }

        if self.settings.overlap_policy == OverlapPolicy::Skip && !self.queue.is_idle() {
            let outstanding = self.queue.outstanding();
            tracing::info!(
                "Previous cycle still has {} targets outstanding, skipping this cycle",
                outstanding
            );
            self.counters.cycle_skipped();
            report.skipped = Some(SkipReason::Overlap { outstanding });
            return report;
        }

        if self.settings.evict_unrefreshed {
            report.swept = self.sweep_unrefreshed();
        }

        let nodes = match self.directory.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::warn!("Skipping cycle, node directory unavailable: {}", e);
                self.counters.cycle_skipped();
                report.skipped = Some(SkipReason::DirectoryUnavailable(e.to_string()));
                return report;
            }
        };
        report.listed = nodes.len();
        report.evicted = self.evict_removed(&nodes);

        let now = self.clock.now();
        for node in &nodes {
            let Some(target) = self.to_target(node) else {
                report.filtered += 1;
                continue;
            };

            if !self.tracker.is_eligible(&node.id, now) {
                tracing::debug!("Node {} is suspended, not enqueued", node.id);
                report.suspended += 1;
                continue;
            }

            match self.queue.push(target) {
                PushOutcome::Accepted => report.enqueued += 1,
                PushOutcome::Rejected => report.rejected += 1,
                PushOutcome::Closed => break,
            }
        }

        self.counters.cycle_run();
        tracing::info!(
            "Cycle enqueued {} of {} nodes ({} suspended, {} filtered, {} rejected, {} evicted)",
            report.enqueued,
            report.listed,
            report.suspended,
            report.filtered,
            report.rejected,
            report.evicted
        );
        report
    }

    /// Turns a directory node into a crawl target, `None` if it must not be crawled
    fn to_target(&self, node: &TargetNode) -> Option<CrawlTarget> {
        if self.settings.self_node_id.as_deref() == Some(node.id.as_str()) {
            return None;
        }

        let Some(protocol) = self.registry.select_protocol(&node.supported_protocols) else {
            tracing::warn!("Node {} lists no protocols, not crawled", node.id);
            return None;
        };

        if !self.registry.supports(protocol) {
            tracing::warn!(
                "No protocol adapter found for protocol '{}' of node {}",
                protocol,
                node.id
            );
        }

        Some(CrawlTarget::new(&node.id, protocol, &node.url))
    }

    /// Removes cache entries and failure state of nodes that left the directory
    fn evict_removed(&self, nodes: &[TargetNode]) -> usize {
        let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        let cached = match self.store.node_ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Cannot list cached nodes for eviction: {}", e);
                return 0;
            }
        };

        let mut evicted = 0;
        for node_id in cached.iter().filter(|id| !known.contains(id.as_str())) {
            match self.store.remove(node_id) {
                Ok(true) => {
                    evicted += 1;
                    tracing::info!("Evicted catalog of {}, node left the directory", node_id);
                }
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to evict catalog of {}: {}", node_id, e),
            }
            self.reporter.forget(node_id);
        }

        let forgotten = self.tracker.retain_nodes(&known);
        if forgotten > 0 {
            tracing::debug!("Dropped failure state of {} departed nodes", forgotten);
        }
        evicted
    }

    /// Deletes entries marked in the previous sweep, then marks everything
    ///
    /// An entry survives only if a crawl refreshed it in between.
    fn sweep_unrefreshed(&self) -> usize {
        let deleted = match self.store.delete_expired() {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!("Failed to delete unrefreshed catalogs: {}", e);
                0
            }
        };
        if let Err(e) = self.store.expire_all() {
            tracing::error!("Failed to mark catalogs for expiry: {}", e);
        }
        if deleted > 0 {
            tracing::info!("Removed {} catalogs not refreshed during the last cycle", deleted);
        }
        deleted
    }

    /// Stops the timer and the pool
    ///
    /// Queued targets are discarded and in-flight fetches are cancelled. Safe
    /// to call more than once; later calls return immediately.
    pub async fn stop(&self) {
        {
            let mut state = self.lock_state();
            match *state {
                ManagerState::Idle => {
                    *state = ManagerState::Stopped;
                    return;
                }
                ManagerState::Stopping | ManagerState::Stopped => return,
                ManagerState::Running => *state = ManagerState::Stopping,
            }
        }

        tracing::info!("Stopping execution manager");
        self.shutdown.cancel();
        self.queue.close();

        let handles = std::mem::take(&mut *self.lock_handles());
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!("A crawler task panicked: {}", e);
                }
            }
        }

        *self.lock_state() = ManagerState::Stopped;
        tracing::info!("Execution manager stopped");
    }

    /// Waits until nothing is queued or in flight, up to `timeout`
    ///
    /// Returns whether the queue drained in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.queue.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    pub fn state(&self) -> ManagerState {
        *self.lock_state()
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<RetryTracker> {
        &self.tracker
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn counters(&self) -> &CrawlCounters {
        &self.counters
    }

    /// Crawl totals including queue rejections
    pub fn stats(&self) -> CounterSnapshot {
        CounterSnapshot {
            queue_rejected: self.queue.rejected_count(),
            ..self.counters.snapshot()
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
