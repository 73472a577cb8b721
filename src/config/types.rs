use crate::crawler::FetchErrorKind;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for the catalog crawler
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
}

/// Crawl engine behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Whether crawling is globally enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of crawler workers sharing the work queue
    #[serde(rename = "worker-pool-size", default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Time between two crawl cycles (seconds)
    #[serde(rename = "cycle-interval-secs", default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,

    /// Delay before the first cycle (seconds)
    #[serde(rename = "initial-delay-secs", default)]
    pub initial_delay_secs: u64,

    /// Upper bound on a single catalog fetch (milliseconds)
    #[serde(rename = "fetch-timeout-ms", default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum number of queued targets, 0 means unbounded
    #[serde(rename = "queue-capacity", default)]
    pub queue_capacity: usize,

    /// What to do when a tick fires while the previous cycle is still draining
    #[serde(rename = "overlap-policy", default)]
    pub overlap_policy: OverlapPolicy,

    /// Id of the local node, which is never crawled
    #[serde(rename = "self-node-id", default)]
    pub self_node_id: Option<String>,
}

impl CrawlerConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Queue capacity as an option, `None` meaning unbounded
    pub fn queue_capacity(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_pool_size: default_worker_pool_size(),
            cycle_interval_secs: default_cycle_interval_secs(),
            initial_delay_secs: 0,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            queue_capacity: 0,
            overlap_policy: OverlapPolicy::default(),
            self_node_id: None,
        }
    }
}

/// Policy for ticks that fire while earlier work is still outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Skip the tick, so at most one crawl pass per node is in flight
    #[default]
    Skip,
    /// Enqueue anyway and let the queue grow
    Allow,
}

/// Failure tracking and suspension configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failures after which a node is suspended
    #[serde(rename = "failure-threshold", default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Cooldown of the first suspension (seconds)
    #[serde(
        rename = "suspension-base-cooldown-secs",
        default = "default_base_cooldown_secs"
    )]
    pub suspension_base_cooldown_secs: u64,

    /// Upper bound on the growth exponent of the cooldown
    #[serde(rename = "suspension-cooldown-cap", default = "default_cooldown_cap")]
    pub suspension_cooldown_cap: u32,

    /// How the cooldown grows with repeated suspensions
    #[serde(rename = "cooldown-growth", default)]
    pub cooldown_growth: CooldownGrowth,

    /// Per failure kind threshold overrides
    #[serde(
        rename = "kind-thresholds",
        default,
        deserialize_with = "deserialize_kind_thresholds"
    )]
    pub kind_thresholds: HashMap<FetchErrorKind, u32>,
}

impl RetryConfig {
    pub fn base_cooldown(&self) -> Duration {
        Duration::from_secs(self.suspension_base_cooldown_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            suspension_base_cooldown_secs: default_base_cooldown_secs(),
            suspension_cooldown_cap: default_cooldown_cap(),
            cooldown_growth: CooldownGrowth::default(),
            kind_thresholds: HashMap::new(),
        }
    }
}

/// Growth function of the suspension cooldown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownGrowth {
    /// `base * 2^min(suspensions, cap)`
    #[default]
    Exponential,
    /// `base * (1 + min(suspensions, cap))`
    Linear,
}

/// Catalog cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Storage backend for cached catalogs
    #[serde(default)]
    pub backend: CacheBackend,

    /// Path to the SQLite database file (sqlite backend only)
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,

    /// Drop entries that were not refreshed during a full cycle
    #[serde(rename = "evict-unrefreshed", default)]
    pub evict_unrefreshed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Node directory configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    /// JSON file listing the target nodes, re-read on every cycle
    #[serde(rename = "nodes-file", default)]
    pub nodes_file: Option<String>,

    /// Nodes declared inline in the configuration
    #[serde(rename = "node", default)]
    pub nodes: Vec<NodeEntry>,
}

/// A crawl target declared in the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NodeEntry {
    /// Stable node identifier
    pub id: String,

    /// Base URL of the node's catalog endpoint
    pub url: String,

    /// Protocols the node speaks, in order of preference
    #[serde(rename = "supported-protocols", default)]
    pub supported_protocols: Vec<String>,
}

/// HTTP catalog adapter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Number of datasets requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: usize,

    /// Upper bound on pages fetched from one node in one crawl
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: usize,

    /// User agent sent with catalog requests
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            user_agent: default_user_agent(),
        }
    }
}

/// Reads `[retry.kind-thresholds]`, whose keys are failure kind names
fn deserialize_kind_thresholds<'de, D>(
    deserializer: D,
) -> Result<HashMap<FetchErrorKind, u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, u32>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(kind, threshold)| {
            kind.parse::<FetchErrorKind>()
                .map(|kind| (kind, threshold))
                .map_err(serde::de::Error::custom)
        })
        .collect()
}

fn default_true() -> bool {
    true
}

fn default_worker_pool_size() -> usize {
    2
}

fn default_cycle_interval_secs() -> u64 {
    60
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_base_cooldown_secs() -> u64 {
    10
}

fn default_cooldown_cap() -> u32 {
    6
}

fn default_page_size() -> usize {
    100
}

fn default_max_pages() -> usize {
    1000
}

fn default_user_agent() -> String {
    format!("catalog-crawler/{}", env!("CARGO_PKG_VERSION"))
}
