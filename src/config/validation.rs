use crate::config::types::{
    AdapterConfig, CacheBackend, CacheConfig, Config, CrawlerConfig, DirectoryConfig, RetryConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Cycle intervals below this many seconds are accepted but logged as a warning
pub const SHORT_INTERVAL_WARNING_SECS: u64 = 10;

/// Largest allowed cooldown growth exponent
const MAX_COOLDOWN_CAP: u32 = 16;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_cache_config(&config.cache)?;
    validate_directory_config(&config.directory)?;
    validate_adapter_config(&config.adapter)?;
    Ok(())
}

/// Validates crawl engine configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_pool_size < 1 || config.worker_pool_size > 256 {
        return Err(ConfigError::Validation(format!(
            "worker_pool_size must be between 1 and 256, got {}",
            config.worker_pool_size
        )));
    }

    if config.cycle_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "cycle_interval_secs must be >= 1".to_string(),
        ));
    }

    if config.cycle_interval_secs < SHORT_INTERVAL_WARNING_SECS {
        tracing::warn!(
            "Cycle interval of {}s is very short and may cause high network load",
            config.cycle_interval_secs
        );
    }

    if config.fetch_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_ms must be >= 100ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    if let Some(self_id) = &config.self_node_id {
        if self_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "self_node_id cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates failure tracking configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "failure_threshold must be >= 1".to_string(),
        ));
    }

    if config.suspension_cooldown_cap > MAX_COOLDOWN_CAP {
        return Err(ConfigError::Validation(format!(
            "suspension_cooldown_cap must be <= {}, got {}",
            MAX_COOLDOWN_CAP, config.suspension_cooldown_cap
        )));
    }

    for (kind, threshold) in &config.kind_thresholds {
        if *threshold < 1 {
            return Err(ConfigError::Validation(format!(
                "threshold for failure kind '{}' must be >= 1",
                kind
            )));
        }
    }

    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.backend == CacheBackend::Sqlite {
        match &config.database_path {
            Some(path) if !path.is_empty() => {}
            _ => {
                return Err(ConfigError::Validation(
                    "database_path is required for the sqlite cache backend".to_string(),
                ))
            }
        }
    }

    Ok(())
}

/// Validates inline node declarations
fn validate_directory_config(config: &DirectoryConfig) -> Result<(), ConfigError> {
    if let Some(path) = &config.nodes_file {
        if path.is_empty() {
            return Err(ConfigError::Validation(
                "nodes_file cannot be empty when set".to_string(),
            ));
        }
    }

    let mut seen = HashSet::new();
    for node in &config.nodes {
        if node.id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "node id cannot be empty".to_string(),
            ));
        }

        if !seen.insert(node.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "node id '{}' is declared more than once",
                node.id
            )));
        }

        Url::parse(&node.url).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid url for node '{}': {}", node.id, e))
        })?;
    }

    Ok(())
}

/// Validates HTTP adapter configuration
fn validate_adapter_config(config: &AdapterConfig) -> Result<(), ConfigError> {
    if config.page_size < 1 {
        return Err(ConfigError::Validation(
            "page_size must be >= 1".to_string(),
        ));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1".to_string(),
        ));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}
