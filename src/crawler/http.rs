//! HTTP catalog adapter
//!
//! Fetches catalogs over the dataspace protocol HTTP binding. Two protocol
//! generations are supported; they differ in the request path, the request
//! message layout and the name of the dataset array in the response.
//!
//! Large catalogs are fetched in pages: as long as a page comes back full, the
//! next page is requested and its datasets are appended to the first page.

use crate::config::AdapterConfig;
use crate::crawler::adapter::ProtocolAdapter;
use crate::crawler::types::{CatalogPayload, CrawlTarget, FetchError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use url::Url;

/// Protocol key of the v0.8 HTTP binding
pub const DSP_PROTOCOL: &str = "dataspace-protocol-http";

/// Protocol key of the 2025-1 HTTP binding
pub const DSP_2025_PROTOCOL: &str = "dataspace-protocol-http:2025-1";

/// Dataspace protocol generation spoken by an [`HttpCatalogAdapter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolGeneration {
    V08,
    V2025,
}

impl ProtocolGeneration {
    pub fn protocol_key(&self) -> &'static str {
        match self {
            ProtocolGeneration::V08 => DSP_PROTOCOL,
            ProtocolGeneration::V2025 => DSP_2025_PROTOCOL,
        }
    }

    fn request_path(&self) -> &'static str {
        match self {
            ProtocolGeneration::V08 => "catalog/request",
            ProtocolGeneration::V2025 => "2025-1/catalog/request",
        }
    }

    fn dataset_key(&self) -> &'static str {
        match self {
            ProtocolGeneration::V08 => "dcat:dataset",
            ProtocolGeneration::V2025 => "dataset",
        }
    }

    fn request_body(&self, offset: usize, limit: usize) -> Value {
        match self {
            ProtocolGeneration::V08 => json!({
                "@context": { "dspace": "https://w3id.org/dspace/v0.8/" },
                "@type": "dspace:CatalogRequestMessage",
                "dspace:filter": { "offset": offset, "limit": limit }
            }),
            ProtocolGeneration::V2025 => json!({
                "@context": ["https://w3id.org/dspace/2025/1/context.jsonld"],
                "@type": "CatalogRequestMessage",
                "filter": [{ "offset": offset, "limit": limit }]
            }),
        }
    }
}

/// Builds the HTTP client shared by the catalog adapters
///
/// # Arguments
///
/// * `config` - The adapter configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &AdapterConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Catalog adapter for one dataspace protocol generation
#[derive(Debug, Clone)]
pub struct HttpCatalogAdapter {
    client: Client,
    generation: ProtocolGeneration,
    page_size: usize,
    max_pages: usize,
}

impl HttpCatalogAdapter {
    pub fn new(client: Client, generation: ProtocolGeneration, config: &AdapterConfig) -> Self {
        Self {
            client,
            generation,
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
        }
    }

    pub fn generation(&self) -> ProtocolGeneration {
        self.generation
    }

    fn request_url(&self, endpoint: &str) -> Result<Url, FetchError> {
        let base = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };
        Url::parse(&base)
            .and_then(|url| url.join(self.generation.request_path()))
            .map_err(|e| FetchError::protocol(format!("Invalid endpoint '{}': {}", endpoint, e)))
    }

    /// Requests one page of the catalog
    async fn fetch_page(
        &self,
        url: &Url,
        offset: usize,
        timeout: Duration,
    ) -> Result<Value, FetchError> {
        let response = self
            .client
            .post(url.clone())
            .timeout(timeout)
            .json(&self.generation.request_body(offset, self.page_size))
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::denied(format!("{} returned {}", url, status)));
        }
        if status.is_server_error() {
            return Err(FetchError::network(format!("{} returned {}", url, status)));
        }
        if !status.is_success() {
            return Err(FetchError::protocol(format!("{} returned {}", url, status)));
        }

        let body = response.bytes().await.map_err(classify_request_error)?;
        let catalog: Value = serde_json::from_slice(&body)
            .map_err(|e| FetchError::protocol(format!("Malformed catalog from {}: {}", url, e)))?;

        if !catalog.is_object() {
            return Err(FetchError::protocol(format!(
                "Catalog from {} is not a JSON object",
                url
            )));
        }
        Ok(catalog)
    }

    /// Number of datasets in a catalog page
    fn dataset_count(&self, page: &Value) -> usize {
        match page.get(self.generation.dataset_key()) {
            Some(Value::Array(datasets)) => datasets.len(),
            Some(Value::Null) | None => 0,
            Some(_) => 1,
        }
    }

    /// Appends the datasets of `page` to those of `catalog`
    fn merge(&self, catalog: &mut Value, page: Value) {
        let key = self.generation.dataset_key();
        let incoming = match page.get(key).cloned() {
            Some(Value::Array(datasets)) => datasets,
            Some(Value::Null) | None => return,
            Some(single) => vec![single],
        };

        if let Some(object) = catalog.as_object_mut() {
            let datasets = object
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match datasets {
                Value::Array(existing) => existing.extend(incoming),
                other => {
                    let mut merged = vec![other.take()];
                    merged.extend(incoming);
                    *other = Value::Array(merged);
                }
            }
        }
    }
}

fn classify_request_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::timeout("Request timeout")
    } else if e.is_connect() {
        FetchError::network(format!("Connection failed: {}", e))
    } else if e.is_decode() {
        FetchError::protocol(e.to_string())
    } else {
        FetchError::network(e.to_string())
    }
}

#[async_trait]
impl ProtocolAdapter for HttpCatalogAdapter {
    fn protocol(&self) -> &str {
        self.generation.protocol_key()
    }

    async fn fetch(
        &self,
        target: &CrawlTarget,
        timeout: Duration,
    ) -> Result<CatalogPayload, FetchError> {
        let url = self.request_url(&target.endpoint)?;
        let deadline = Instant::now() + timeout;

        let mut catalog = self.fetch_page(&url, 0, timeout).await?;
        let mut received = self.dataset_count(&catalog);
        let mut pages = 1;

        while received >= self.page_size && pages < self.max_pages {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FetchError::timeout(format!(
                    "Catalog of {} not complete after {} pages",
                    target.node_id, pages
                )));
            }

            let offset = pages * self.page_size;
            tracing::debug!(
                "Fetching next batch of {} from {} to {}",
                target.node_id,
                offset,
                offset + self.page_size
            );
            let page = self.fetch_page(&url, offset, remaining).await?;
            received = self.dataset_count(&page);
            self.merge(&mut catalog, page);
            pages += 1;
        }

        if received >= self.page_size {
            tracing::warn!(
                "Stopped paging catalog of {} after {} pages",
                target.node_id,
                pages
            );
        }

        Ok(catalog)
    }
}
