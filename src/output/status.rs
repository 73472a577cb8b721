//! Status report built from the catalog cache and the retry tracker

use crate::crawler::CounterSnapshot;
use crate::state::RetryTracker;
use crate::storage::CatalogStore;
use crate::CrawlerError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Status of one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub node_id: String,

    /// When the cached catalog was fetched, if any is cached
    pub last_updated: Option<DateTime<Utc>>,

    /// Number of datasets in the cached catalog
    pub datasets: Option<usize>,

    /// Cached entry is marked for the staleness sweep
    pub expired: bool,

    pub consecutive_failures: u32,
    pub suspended_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl NodeStatus {
    fn new(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            last_updated: None,
            datasets: None,
            expired: false,
            consecutive_failures: 0,
            suspended_until: None,
            last_error: None,
        }
    }
}

/// Crawler status summary
#[derive(Debug, Clone)]
pub struct CrawlStatus {
    pub generated_at: DateTime<Utc>,
    pub cached_entries: usize,
    pub suspended_nodes: usize,
    pub nodes: Vec<NodeStatus>,
    pub counters: Option<CounterSnapshot>,
}

/// Counts the datasets of a catalog under either protocol generation
fn count_datasets(payload: &serde_json::Value) -> Option<usize> {
    ["dcat:dataset", "dataset"]
        .iter()
        .find_map(|key| payload.get(*key))
        .map(|datasets| match datasets {
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::Null => 0,
            _ => 1,
        })
}

/// Loads the status of every cached or tracked node
///
/// # Arguments
///
/// * `store` - The catalog cache
/// * `tracker` - Failure state, when a crawler ran in this process
/// * `counters` - Crawl totals, when a crawler ran in this process
/// * `now` - Reference time for suspension windows
///
/// # Returns
///
/// * `Ok(CrawlStatus)` - Nodes ordered by id
/// * `Err(CrawlerError)` - The cache could not be read
pub fn load_status(
    store: &dyn CatalogStore,
    tracker: Option<&RetryTracker>,
    counters: Option<CounterSnapshot>,
    now: DateTime<Utc>,
) -> Result<CrawlStatus, CrawlerError> {
    let mut nodes: BTreeMap<String, NodeStatus> = BTreeMap::new();

    let entries = store.snapshot()?;
    let cached_entries = entries.len();
    for entry in entries {
        let status = nodes
            .entry(entry.node_id.clone())
            .or_insert_with(|| NodeStatus::new(&entry.node_id));
        status.last_updated = Some(entry.last_updated);
        status.datasets = count_datasets(&entry.payload);
        status.expired = entry.expired;
    }

    let mut suspended_nodes = 0;
    if let Some(tracker) = tracker {
        for state in tracker.all() {
            let status = nodes
                .entry(state.node_id.clone())
                .or_insert_with(|| NodeStatus::new(&state.node_id));
            status.consecutive_failures = state.consecutive_failures;
            if state.is_suspended(now) {
                suspended_nodes += 1;
                status.suspended_until = state.suspended_until;
            }
            status.last_error = state
                .last_error
                .map(|e| format!("{}: {}", e.kind, e.message));
        }
    }

    Ok(CrawlStatus {
        generated_at: now,
        cached_entries,
        suspended_nodes,
        nodes: nodes.into_values().collect(),
        counters,
    })
}

/// Prints the status to stdout in a formatted manner
pub fn print_status(status: &CrawlStatus) {
    println!("=== Catalog Crawler Status ===\n");

    println!("Overview:");
    println!("  Generated at: {}", status.generated_at.to_rfc3339());
    println!("  Cached catalogs: {}", status.cached_entries);
    println!("  Suspended nodes: {}", status.suspended_nodes);
    println!();

    if let Some(counters) = &status.counters {
        println!("Crawls:");
        println!("  Succeeded: {}", counters.succeeded);
        println!("  Failed: {}", counters.failed);
        println!("  Out-of-date results discarded: {}", counters.stale_discarded);
        println!("  Cache write errors: {}", counters.storage_errors);
        println!("  Targets dropped by a full queue: {}", counters.queue_rejected);
        println!(
            "  Cycles: {} run, {} skipped",
            counters.cycles_run, counters.cycles_skipped
        );
        println!();
    }

    if status.nodes.is_empty() {
        println!("No nodes crawled yet.");
        return;
    }

    println!("Nodes:");
    for node in &status.nodes {
        let cached = match (node.last_updated, node.datasets) {
            (Some(at), Some(datasets)) => {
                format!("{} datasets, fetched {}", datasets, at.to_rfc3339())
            }
            (Some(at), None) => format!("fetched {}", at.to_rfc3339()),
            _ => "not cached".to_string(),
        };
        let expired = if node.expired { " (expiring)" } else { "" };
        println!("  {}: {}{}", node.node_id, cached, expired);

        if let Some(until) = node.suspended_until {
            println!(
                "    suspended until {} after {} failures",
                until.to_rfc3339(),
                node.consecutive_failures
            );
        } else if node.consecutive_failures > 0 {
            println!("    {} consecutive failures", node.consecutive_failures);
        }
        if let Some(error) = &node.last_error {
            println!("    last error: {}", error);
        }
    }
}
