//! Crawl engine
//!
//! This module contains the moving parts of catalog crawling:
//! - Protocol adapters and the registry resolving them by protocol key
//! - The work queue shared by the crawler pool
//! - Crawler workers fetching catalogs and reporting outcomes
//! - The execution manager driving periodic crawl cycles

mod adapter;
mod http;
mod manager;
mod queue;
mod registry;
mod report;
mod types;
mod worker;

pub use adapter::ProtocolAdapter;
pub use http::{
    build_http_client, HttpCatalogAdapter, ProtocolGeneration, DSP_2025_PROTOCOL, DSP_PROTOCOL,
};
pub use manager::{CycleReport, ExecutionManager, ManagerSettings, ManagerState, SkipReason};
pub use queue::{Completion, PushOutcome, WorkQueue};
pub use registry::AdapterRegistry;
pub use report::{CounterSnapshot, CrawlCounters, OutcomeReporter};
pub use types::{CatalogPayload, CrawlResult, CrawlTarget, FetchError, FetchErrorKind};
pub use worker::Crawler;

use crate::config::AdapterConfig;
use crate::CrawlerError;
use std::sync::Arc;

/// Builds a registry holding the HTTP adapters of both protocol generations
///
/// # Arguments
///
/// * `config` - The adapter configuration
///
/// # Returns
///
/// * `Ok(AdapterRegistry)` - Registry ready to hand to the execution manager
/// * `Err(CrawlerError)` - The HTTP client could not be built
pub fn default_registry(config: &AdapterConfig) -> Result<AdapterRegistry, CrawlerError> {
    let client = build_http_client(config)?;
    let mut registry = AdapterRegistry::new();

    for generation in [ProtocolGeneration::V08, ProtocolGeneration::V2025] {
        registry.register(Arc::new(HttpCatalogAdapter::new(
            client.clone(),
            generation,
            config,
        )))?;
    }

    Ok(registry)
}
