use crate::crawler::types::{CatalogPayload, CrawlTarget, FetchError};
use async_trait::async_trait;
use std::time::Duration;

/// Talks one catalog protocol to a node
///
/// Implementations fetch the full catalog of a single target. They must not
/// touch the cache or the retry tracker; the crawler reports the outcome.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    /// Protocol key under which the adapter is registered
    fn protocol(&self) -> &str;

    /// Fetches the catalog of `target`, finishing within `timeout`
    async fn fetch(
        &self,
        target: &CrawlTarget,
        timeout: Duration,
    ) -> Result<CatalogPayload, FetchError>;
}
