//! Integration tests for crawl cycles
//!
//! These tests drive the execution manager through whole cycles against
//! scripted adapters and real stores, and check what ends up in the cache.

use async_trait::async_trait;
use catalog_crawler::config::{load_config, CacheBackend, CacheConfig};
use catalog_crawler::crawler::{
    default_registry, AdapterRegistry, CatalogPayload, CrawlTarget, ExecutionManager, FetchError,
    FetchErrorKind, ManagerSettings, ManagerState, ProtocolAdapter, SkipReason,
};
use catalog_crawler::directory::{
    build_directory, FileNodeDirectory, InMemoryNodeDirectory, NodeDirectory, TargetNode,
};
use catalog_crawler::output::load_status;
use catalog_crawler::query::{CatalogFilter, CatalogQueryService};
use catalog_crawler::state::{Clock, ManualClock, RetryPolicy};
use catalog_crawler::storage::{open_store, CatalogStore, InMemoryCatalogStore};
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROTOCOL: &str = "fleet";

/// Adapter whose nodes either answer immediately or never answer at all
#[derive(Default)]
struct FleetAdapter {
    unreachable: Mutex<HashSet<String>>,
}

impl FleetAdapter {
    fn set_unreachable(&self, node_id: &str, unreachable: bool) {
        let mut nodes = self.unreachable.lock().unwrap();
        if unreachable {
            nodes.insert(node_id.to_string());
        } else {
            nodes.remove(node_id);
        }
    }
}

#[async_trait]
impl ProtocolAdapter for FleetAdapter {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    async fn fetch(
        &self,
        target: &CrawlTarget,
        _timeout: Duration,
    ) -> Result<CatalogPayload, FetchError> {
        let unreachable = self.unreachable.lock().unwrap().contains(&target.node_id);
        if unreachable {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return Err(FetchError::network("unreachable"));
        }

        Ok(json!({
            "@id": format!("catalog-{}", target.node_id),
            "dcat:dataset": [{ "@id": format!("{}-dataset", target.node_id) }]
        }))
    }
}

fn create_test_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

fn create_test_settings() -> ManagerSettings {
    ManagerSettings {
        worker_pool_size: 2,
        fetch_timeout: Duration::from_millis(100),
        ..ManagerSettings::default()
    }
}

fn create_fleet_manager(
    adapter: Arc<FleetAdapter>,
    directory: Arc<dyn NodeDirectory>,
    store: Arc<dyn CatalogStore>,
    clock: Arc<ManualClock>,
    policy: RetryPolicy,
) -> Arc<ExecutionManager> {
    let mut registry = AdapterRegistry::new();
    registry.register(adapter).unwrap();

    Arc::new(
        ExecutionManager::new(create_test_settings(), policy, directory, registry, store)
            .with_clock(clock),
    )
}

fn fleet_node(id: &str) -> TargetNode {
    TargetNode::new(id, format!("http://{}.test", id), &[PROTOCOL])
}

async fn run_and_drain(manager: &ExecutionManager) {
    let report = manager.run_cycle().await;
    assert_eq!(report.skipped, None);
    assert!(
        manager.wait_idle(Duration::from_secs(5)).await,
        "cycle did not drain"
    );
}

#[tokio::test]
async fn test_three_node_fleet_with_one_unreachable_node() {
    let adapter = Arc::new(FleetAdapter::default());
    adapter.set_unreachable("b", true);

    let directory = Arc::new(InMemoryNodeDirectory::from_nodes(vec![
        fleet_node("a"),
        fleet_node("b"),
        fleet_node("c"),
    ]));
    let store = Arc::new(InMemoryCatalogStore::new());
    let clock = create_test_clock();
    let policy = RetryPolicy {
        failure_threshold: 2,
        base_cooldown: Duration::from_secs(10),
        ..RetryPolicy::default()
    };

    let manager = create_fleet_manager(
        adapter.clone(),
        directory,
        store.clone(),
        clock.clone(),
        policy,
    );
    manager.start_manual().unwrap();

    // Two cycles: A and C land in the cache, B times out twice
    run_and_drain(&manager).await;
    clock.advance(chrono::Duration::seconds(1));
    run_and_drain(&manager).await;

    let b = manager.tracker().state("b").unwrap();
    assert_eq!(b.consecutive_failures, 2);
    assert_eq!(
        b.last_error.as_ref().map(|e| e.kind),
        Some(FetchErrorKind::Timeout)
    );
    assert!(!manager.tracker().is_eligible("b", clock.now()));

    let a = store.get("a").unwrap().unwrap();
    assert_eq!(a.last_updated, clock.now());
    assert!(store.get("c").unwrap().is_some());
    assert!(store.get("b").unwrap().is_none());

    // While suspended, B is not even enqueued
    clock.advance(chrono::Duration::seconds(1));
    let report = manager.run_cycle().await;
    assert_eq!(report.enqueued, 2);
    assert_eq!(report.suspended, 1);
    assert!(manager.wait_idle(Duration::from_secs(5)).await);

    // Cooldown elapses and B recovers
    clock.advance(chrono::Duration::seconds(10));
    adapter.set_unreachable("b", false);
    run_and_drain(&manager).await;

    let b_entry = store.get("b").unwrap().unwrap();
    assert_eq!(b_entry.last_updated, clock.now());
    assert_eq!(
        manager.tracker().state("b").unwrap().consecutive_failures,
        0
    );
    assert!(manager.tracker().is_eligible("b", clock.now()));

    let stats = manager.stats();
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.succeeded, 9);
    assert_eq!(stats.cycles_run, 4);

    manager.stop().await;
}

#[tokio::test]
async fn test_stop_abandons_in_flight_fetches() {
    let adapter = Arc::new(FleetAdapter::default());
    adapter.set_unreachable("a", true);
    adapter.set_unreachable("b", true);

    let directory = Arc::new(InMemoryNodeDirectory::from_nodes(vec![
        fleet_node("a"),
        fleet_node("b"),
        fleet_node("c"),
    ]));
    let store = Arc::new(InMemoryCatalogStore::new());

    let mut settings = create_test_settings();
    settings.fetch_timeout = Duration::from_secs(60);
    let mut registry = AdapterRegistry::new();
    registry.register(adapter).unwrap();
    let manager = Arc::new(
        ExecutionManager::new(
            settings,
            RetryPolicy::default(),
            directory,
            registry,
            store.clone(),
        )
        .with_clock(create_test_clock()),
    );
    manager.start_manual().unwrap();

    let report = manager.run_cycle().await;
    assert_eq!(report.enqueued, 3);

    // Let both workers pick up a hanging fetch
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), manager.stop())
        .await
        .expect("stop did not return promptly");

    assert_eq!(manager.state(), ManagerState::Stopped);
    assert!(manager.queue().is_closed());
    assert!(manager.queue().is_idle());

    // Cancelled fetches are neither cached nor counted as failures
    assert!(manager.tracker().is_empty());
    assert_eq!(manager.stats().failed, 0);
    assert!(store.get("a").unwrap().is_none());

    let report = manager.run_cycle().await;
    assert_eq!(report.skipped, Some(SkipReason::NotRunning));
}

#[tokio::test]
async fn test_sqlite_cache_survives_restart() {
    let dir = TempDir::new().unwrap();
    let cache = CacheConfig {
        backend: CacheBackend::Sqlite,
        database_path: Some(dir.path().join("catalog.db").display().to_string()),
        evict_unrefreshed: false,
    };

    let adapter = Arc::new(FleetAdapter::default());
    let directory = Arc::new(InMemoryNodeDirectory::from_nodes(vec![
        fleet_node("a"),
        fleet_node("b"),
    ]));
    let clock = create_test_clock();

    {
        let store = open_store(&cache).unwrap();
        let manager = create_fleet_manager(
            adapter,
            directory,
            store,
            clock.clone(),
            RetryPolicy::default(),
        );
        manager.start_manual().unwrap();
        run_and_drain(&manager).await;
        manager.stop().await;
    }

    let reopened = open_store(&cache).unwrap();
    let status = load_status(reopened.as_ref(), None, None, clock.now()).unwrap();
    assert_eq!(status.cached_entries, 2);
    assert_eq!(status.nodes[0].node_id, "a");
    assert_eq!(status.nodes[0].datasets, Some(1));
    assert_eq!(status.nodes[0].last_updated, Some(clock.now()));
}

#[tokio::test]
async fn test_nodes_leaving_the_directory_are_evicted() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"id": "a", "url": "http://a.test", "supportedProtocols": ["{p}"]}},
            {{"id": "b", "url": "http://b.test", "supportedProtocols": ["{p}"]}}
        ]"#,
        p = PROTOCOL
    )
    .unwrap();
    file.flush().unwrap();

    let adapter = Arc::new(FleetAdapter::default());
    let directory = Arc::new(FileNodeDirectory::new(file.path()));
    let store = Arc::new(InMemoryCatalogStore::new());
    let clock = create_test_clock();
    let manager = create_fleet_manager(
        adapter,
        directory,
        store.clone(),
        clock.clone(),
        RetryPolicy::default(),
    );
    manager.start_manual().unwrap();

    run_and_drain(&manager).await;
    assert_eq!(store.len().unwrap(), 2);

    // The file is re-read on every cycle
    std::fs::write(
        file.path(),
        format!(
            r#"[{{"id": "a", "url": "http://a.test", "supportedProtocols": ["{}"]}}]"#,
            PROTOCOL
        ),
    )
    .unwrap();

    clock.advance(chrono::Duration::seconds(60));
    let report = manager.run_cycle().await;
    assert_eq!(report.listed, 1);
    assert_eq!(report.evicted, 1);
    assert!(manager.wait_idle(Duration::from_secs(5)).await);

    assert!(store.get("b").unwrap().is_none());
    assert_eq!(store.get("a").unwrap().unwrap().last_updated, clock.now());

    manager.stop().await;
}

#[tokio::test]
async fn test_query_service_reads_crawled_catalogs() {
    let adapter = Arc::new(FleetAdapter::default());
    let directory = Arc::new(InMemoryNodeDirectory::from_nodes(vec![
        fleet_node("a"),
        fleet_node("b"),
        fleet_node("c"),
    ]));
    let store: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalogStore::new());
    let manager = create_fleet_manager(
        adapter,
        directory,
        store.clone(),
        create_test_clock(),
        RetryPolicy::default(),
    );
    manager.start_manual().unwrap();
    run_and_drain(&manager).await;
    manager.stop().await;

    let service = CatalogQueryService::new(store);
    assert_eq!(service.snapshot().unwrap().len(), 3);

    let filter = CatalogFilter::new().nodes(["a", "c"]);
    let mut ids: Vec<_> = service
        .query(&filter)
        .unwrap()
        .into_iter()
        .map(|e| e.node_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "c"]);
}

#[tokio::test]
async fn test_configured_crawler_against_http_node() {
    let node = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/protocol/catalog/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@id": "catalog-provider",
            "dcat:dataset": [{ "@id": "asset-1" }, { "@id": "asset-2" }]
        })))
        .mount(&node)
        .await;

    let mut config_file = NamedTempFile::new().unwrap();
    write!(
        config_file,
        r#"
[crawler]
worker-pool-size = 1
fetch-timeout-ms = 2000
self-node-id = "me"

[directory]
[[directory.node]]
id = "provider"
url = "{uri}/protocol"
supported-protocols = ["dataspace-protocol-http"]

[[directory.node]]
id = "me"
url = "{uri}/me"
supported-protocols = ["dataspace-protocol-http"]
"#,
        uri = node.uri()
    )
    .unwrap();
    config_file.flush().unwrap();

    let config = load_config(config_file.path()).unwrap();
    let store = open_store(&config.cache).unwrap();
    let manager = Arc::new(ExecutionManager::new(
        ManagerSettings::from_config(&config),
        RetryPolicy::from_config(&config.retry),
        build_directory(&config.directory),
        default_registry(&config.adapter).unwrap(),
        store.clone(),
    ));
    manager.start_manual().unwrap();

    let report = manager.run_cycle().await;
    assert_eq!(report.listed, 2);
    assert_eq!(report.filtered, 1);
    assert_eq!(report.enqueued, 1);
    assert!(manager.wait_idle(Duration::from_secs(5)).await);
    manager.stop().await;

    let entry = store.get("provider").unwrap().unwrap();
    assert_eq!(entry.payload["dcat:dataset"].as_array().unwrap().len(), 2);
    assert!(store.get("me").unwrap().is_none());
}
