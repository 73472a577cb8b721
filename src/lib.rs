//! Catalog Crawler: a federated catalog cache
//!
//! This crate periodically crawls a fleet of participant nodes for their published
//! catalogs, keeps the latest successful result per node in a local cache, and
//! answers reads from that cache without touching the network.

pub mod config;
pub mod crawler;
pub mod directory;
pub mod output;
pub mod query;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for catalog crawler operations
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Node directory error: {0}")]
    Directory(#[from] directory::DirectoryError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("No protocol adapter registered for protocol '{protocol}'")]
    UnsupportedProtocol { protocol: String },

    #[error("A protocol adapter is already registered for protocol '{protocol}'")]
    DuplicateAdapter { protocol: String },

    #[error("Cannot start crawling: no protocol adapters are registered")]
    EmptyRegistry,

    #[error("Invalid worker pool size: {0}")]
    InvalidPoolSize(usize),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crawler::ManagerState,
        to: crawler::ManagerState,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for catalog crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlResult, CrawlTarget, ExecutionManager, FetchErrorKind};
pub use state::{NodeFailureState, RetryTracker};
pub use storage::{CachedCatalogEntry, CatalogStore};
