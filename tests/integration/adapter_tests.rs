//! Integration tests for the HTTP catalog adapter
//!
//! These tests use wiremock to stand in for participant nodes.

use catalog_crawler::config::AdapterConfig;
use catalog_crawler::crawler::{
    build_http_client, CrawlTarget, FetchErrorKind, HttpCatalogAdapter, ProtocolAdapter,
    ProtocolGeneration, DSP_2025_PROTOCOL, DSP_PROTOCOL,
};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_adapter(generation: ProtocolGeneration, page_size: usize) -> HttpCatalogAdapter {
    let config = AdapterConfig {
        page_size,
        max_pages: 10,
        user_agent: "catalog-crawler-test".to_string(),
    };
    let client = build_http_client(&config).unwrap();
    HttpCatalogAdapter::new(client, generation, &config)
}

fn target(server: &MockServer, protocol: &str) -> CrawlTarget {
    CrawlTarget::new("provider", protocol, format!("{}/api/dsp", server.uri()))
}

fn datasets(ids: &[&str]) -> Vec<Value> {
    ids.iter().map(|id| json!({ "@id": id })).collect()
}

#[tokio::test]
async fn test_fetches_single_page_catalog() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dsp/catalog/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@id": "catalog-1",
            "dcat:dataset": datasets(&["d1", "d2"])
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = create_adapter(ProtocolGeneration::V08, 10);
    assert_eq!(adapter.protocol(), DSP_PROTOCOL);

    let catalog = adapter
        .fetch(&target(&server, DSP_PROTOCOL), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(catalog["@id"], "catalog-1");
    assert_eq!(catalog["dcat:dataset"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_follows_pages_until_short_page() {
    let server = MockServer::start().await;
    let pages = [
        datasets(&["d1", "d2"]),
        datasets(&["d3", "d4"]),
        datasets(&["d5"]),
    ];
    for page in pages {
        Mock::given(method("POST"))
            .and(path("/api/dsp/catalog/request"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@id": "catalog-1",
                "dcat:dataset": page
            })))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
    }

    let adapter = create_adapter(ProtocolGeneration::V08, 2);
    let catalog = adapter
        .fetch(&target(&server, DSP_PROTOCOL), Duration::from_secs(5))
        .await
        .unwrap();

    let ids: Vec<_> = catalog["dcat:dataset"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["@id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["d1", "d2", "d3", "d4", "d5"]);
}

#[tokio::test]
async fn test_stops_paging_at_max_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dsp/catalog/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dcat:dataset": datasets(&["same"])
        })))
        .expect(2)
        .mount(&server)
        .await;

    let config = AdapterConfig {
        page_size: 1,
        max_pages: 2,
        ..AdapterConfig::default()
    };
    let adapter = HttpCatalogAdapter::new(
        build_http_client(&config).unwrap(),
        ProtocolGeneration::V08,
        &config,
    );

    let catalog = adapter
        .fetch(&target(&server, DSP_PROTOCOL), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(catalog["dcat:dataset"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_2025_generation_uses_its_own_path_and_keys() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dsp/2025-1/catalog/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "@type": "Catalog",
            "dataset": datasets(&["d1"])
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = create_adapter(ProtocolGeneration::V2025, 10);
    assert_eq!(adapter.protocol(), DSP_2025_PROTOCOL);

    let catalog = adapter
        .fetch(&target(&server, DSP_2025_PROTOCOL), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(catalog["dataset"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let cases = [
        (401, FetchErrorKind::Denied),
        (403, FetchErrorKind::Denied),
        (404, FetchErrorKind::Protocol),
        (500, FetchErrorKind::Network),
        (503, FetchErrorKind::Network),
    ];

    for (status, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/dsp/catalog/request"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        let adapter = create_adapter(ProtocolGeneration::V08, 10);
        let err = adapter
            .fetch(&target(&server, DSP_PROTOCOL), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, expected, "status {}", status);
    }
}

#[tokio::test]
async fn test_malformed_catalog_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dsp/catalog/request"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not a catalog</html>"))
        .mount(&server)
        .await;

    let adapter = create_adapter(ProtocolGeneration::V08, 10);
    let err = adapter
        .fetch(&target(&server, DSP_PROTOCOL), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Protocol);
}

#[tokio::test]
async fn test_non_object_catalog_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dsp/catalog/request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["d1", "d2"])))
        .mount(&server)
        .await;

    let adapter = create_adapter(ProtocolGeneration::V08, 10);
    let err = adapter
        .fetch(&target(&server, DSP_PROTOCOL), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Protocol);
}

#[tokio::test]
async fn test_slow_node_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/dsp/catalog/request"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "dcat:dataset": [] }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let adapter = create_adapter(ProtocolGeneration::V08, 10);
    let err = adapter
        .fetch(&target(&server, DSP_PROTOCOL), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Timeout);
}

#[tokio::test]
async fn test_unreachable_node_is_network_error() {
    // Bind and drop a listener to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let adapter = create_adapter(ProtocolGeneration::V08, 10);
    let target = CrawlTarget::new(
        "gone",
        DSP_PROTOCOL,
        format!("http://127.0.0.1:{}/api/dsp", port),
    );
    let err = adapter
        .fetch(&target, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Network);
}
