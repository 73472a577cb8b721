//! Node directory: the list of participants to crawl
//!
//! The directory is consulted once per crawl cycle. It may change between
//! cycles; nodes that disappear are evicted from the cache by the execution
//! manager.

mod file;

pub use file::FileNodeDirectory;

use crate::config::{DirectoryConfig, NodeEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

/// A participant whose catalog is crawled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetNode {
    /// Stable identifier, also the cache key
    #[serde(alias = "name")]
    pub id: String,

    /// Base URL of the node's catalog endpoint
    pub url: String,

    /// Protocols the node speaks, in order of preference
    #[serde(default)]
    pub supported_protocols: Vec<String>,
}

impl TargetNode {
    pub fn new(id: impl Into<String>, url: impl Into<String>, protocols: &[&str]) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            supported_protocols: protocols.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl From<&NodeEntry> for TargetNode {
    fn from(entry: &NodeEntry) -> Self {
        Self {
            id: entry.id.clone(),
            url: entry.url.clone(),
            supported_protocols: entry.supported_protocols.clone(),
        }
    }
}

/// Node directory errors
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Failed to read node list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse node list {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Node directory unavailable: {0}")]
    Unavailable(String),
}

/// Source of crawl targets
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Lists every known node; the order carries no meaning
    async fn list_nodes(&self) -> Result<Vec<TargetNode>, DirectoryError>;
}

/// A directory held in memory, editable at runtime
#[derive(Debug, Default)]
pub struct InMemoryNodeDirectory {
    nodes: RwLock<HashMap<String, TargetNode>>,
}

impl InMemoryNodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = TargetNode>) -> Self {
        let directory = Self::new();
        for node in nodes {
            directory.insert(node);
        }
        directory
    }

    /// Adds a node, replacing any node with the same id
    pub fn insert(&self, node: TargetNode) -> Option<TargetNode> {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.id.clone(), node)
    }

    pub fn remove(&self, node_id: &str) -> Option<TargetNode> {
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NodeDirectory for InMemoryNodeDirectory {
    async fn list_nodes(&self) -> Result<Vec<TargetNode>, DirectoryError> {
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(nodes.values().cloned().collect())
    }
}

/// Builds the directory described by the configuration
///
/// With a `nodes-file` the file is re-read every cycle and inline nodes are
/// added to it; otherwise only the inline nodes are crawled.
pub fn build_directory(config: &DirectoryConfig) -> Arc<dyn NodeDirectory> {
    let inline: Vec<TargetNode> = config.nodes.iter().map(TargetNode::from).collect();

    match &config.nodes_file {
        Some(path) => Arc::new(FileNodeDirectory::new(path).with_static_nodes(inline)),
        None => Arc::new(InMemoryNodeDirectory::from_nodes(inline)),
    }
}
