use crate::crawler::adapter::ProtocolAdapter;
use crate::CrawlerError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps protocol keys to adapters
///
/// Populated before the execution manager starts and read-only afterwards.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn ProtocolAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own protocol key
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The adapter was registered
    /// * `Err(CrawlerError::DuplicateAdapter)` - The key is already taken
    pub fn register(&mut self, adapter: Arc<dyn ProtocolAdapter>) -> Result<(), CrawlerError> {
        let protocol = adapter.protocol().to_string();
        if self.adapters.contains_key(&protocol) {
            return Err(CrawlerError::DuplicateAdapter { protocol });
        }
        tracing::debug!("Registered protocol adapter '{}'", protocol);
        self.adapters.insert(protocol, adapter);
        Ok(())
    }

    /// Looks up the adapter for `protocol`
    pub fn resolve(&self, protocol: &str) -> Result<Arc<dyn ProtocolAdapter>, CrawlerError> {
        self.adapters
            .get(protocol)
            .cloned()
            .ok_or_else(|| CrawlerError::UnsupportedProtocol {
                protocol: protocol.to_string(),
            })
    }

    pub fn supports(&self, protocol: &str) -> bool {
        self.adapters.contains_key(protocol)
    }

    /// Picks the protocol to crawl a node with
    ///
    /// The first protocol in the node's preference list that has an adapter
    /// wins. If none does, the first listed protocol is returned so that the
    /// crawl fails visibly as unsupported. `None` for an empty list.
    pub fn select_protocol<'a>(&self, supported: &'a [String]) -> Option<&'a str> {
        supported
            .iter()
            .find(|protocol| self.supports(protocol))
            .or_else(|| supported.first())
            .map(String::as_str)
    }

    /// Registered protocol keys, sorted
    pub fn protocols(&self) -> Vec<String> {
        let mut protocols: Vec<_> = self.adapters.keys().cloned().collect();
        protocols.sort();
        protocols
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("protocols", &self.protocols())
            .finish()
    }
}
