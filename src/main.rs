//! Catalog Crawler main entry point
//!
//! This is the command-line interface for the federated catalog crawler.

use anyhow::Context;
use catalog_crawler::config::{load_config_with_hash, Config};
use catalog_crawler::crawler::{default_registry, ExecutionManager, ManagerSettings};
use catalog_crawler::directory::{build_directory, NodeDirectory};
use catalog_crawler::output::{load_status, print_status};
use catalog_crawler::state::{Clock, RetryPolicy};
use catalog_crawler::storage::open_store;
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Catalog Crawler: a federated catalog cache
///
/// Periodically asks every participant node in the directory for its
/// published catalog and keeps the latest successful result per node.
#[derive(Parser, Debug)]
#[command(name = "catalog-crawler")]
#[command(version)]
#[command(about = "A federated catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show which nodes would be crawled
    #[arg(long, conflicts_with_all = ["once", "status"])]
    dry_run: bool,

    /// Run a single crawl cycle, print the resulting status and exit
    #[arg(long, conflicts_with_all = ["dry_run", "status"])]
    once: bool,

    /// Show the cached catalogs from the configured store and exit
    #[arg(long, conflicts_with_all = ["dry_run", "once"])]
    status: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config).await?;
    } else if cli.status {
        handle_status(&config)?;
    } else if cli.once {
        handle_once(config).await?;
    } else {
        handle_crawl(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_crawler=info,warn"),
            1 => EnvFilter::new("catalog_crawler=debug,info"),
            2 => EnvFilter::new("catalog_crawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Builds a manager from the configuration without starting it
fn build_manager(config: &Config) -> anyhow::Result<Arc<ExecutionManager>> {
    let store = open_store(&config.cache)?;
    let directory = build_directory(&config.directory);
    let registry = default_registry(&config.adapter)?;

    Ok(Arc::new(ExecutionManager::new(
        ManagerSettings::from_config(config),
        RetryPolicy::from_config(&config.retry),
        directory,
        registry,
        store,
    )))
}

/// Handles the --dry-run mode: validates config and lists the nodes
async fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== Catalog Crawler Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Enabled: {}", config.crawler.enabled);
    println!("  Worker pool size: {}", config.crawler.worker_pool_size);
    println!("  Cycle interval: {}s", config.crawler.cycle_interval_secs);
    println!("  Initial delay: {}s", config.crawler.initial_delay_secs);
    println!("  Fetch timeout: {}ms", config.crawler.fetch_timeout_ms);
    match config.crawler.queue_capacity() {
        Some(capacity) => println!("  Queue capacity: {}", capacity),
        None => println!("  Queue capacity: unbounded"),
    }
    println!("  Overlap policy: {:?}", config.crawler.overlap_policy);
    if let Some(self_id) = &config.crawler.self_node_id {
        println!("  Local node: {}", self_id);
    }

    println!("\nRetry:");
    println!("  Failure threshold: {}", config.retry.failure_threshold);
    println!(
        "  Base cooldown: {}s ({:?}, cap {})",
        config.retry.suspension_base_cooldown_secs,
        config.retry.cooldown_growth,
        config.retry.suspension_cooldown_cap
    );
    for (kind, threshold) in &config.retry.kind_thresholds {
        println!("  Threshold for {}: {}", kind, threshold);
    }

    println!("\nCache:");
    println!("  Backend: {:?}", config.cache.backend);
    if let Some(path) = &config.cache.database_path {
        println!("  Database: {}", path);
    }
    println!("  Evict unrefreshed: {}", config.cache.evict_unrefreshed);

    let registry = default_registry(&config.adapter)?;
    println!("\nProtocols: {}", registry.protocols().join(", "));

    let directory = build_directory(&config.directory);
    let nodes = directory.list_nodes().await?;
    println!("\nNodes ({}):", nodes.len());
    for node in &nodes {
        let marker = if config.crawler.self_node_id.as_deref() == Some(node.id.as_str()) {
            " (local, skipped)"
        } else if registry.select_protocol(&node.supported_protocols).is_none() {
            " (no protocols, skipped)"
        } else {
            ""
        };
        println!("  - {} {}{}", node.id, node.url, marker);
        println!("    protocols: {}", node.supported_protocols.join(", "));
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --status mode: shows the cached catalogs
fn handle_status(config: &Config) -> anyhow::Result<()> {
    let store = open_store(&config.cache)?;
    let status = load_status(store.as_ref(), None, None, Utc::now())?;
    print_status(&status);

    Ok(())
}

/// Handles the --once mode: one cycle, wait for it to drain, print the result
async fn handle_once(config: Config) -> anyhow::Result<()> {
    if !config.crawler.enabled {
        tracing::warn!("Crawling is disabled in the configuration; nothing to crawl");
        return Ok(());
    }

    let manager = build_manager(&config)?;
    manager.start_manual()?;

    let report = manager.run_cycle().await;
    if let Some(reason) = &report.skipped {
        tracing::warn!("Cycle skipped: {:?}", reason);
    }
    tracing::info!(
        "Cycle enqueued {} of {} nodes ({} suspended, {} filtered)",
        report.enqueued,
        report.listed,
        report.suspended,
        report.filtered
    );

    // Every fetch is bounded, so a batch per worker bounds the whole drain
    let pool = config.crawler.worker_pool_size.max(1);
    let batches = report.enqueued.div_ceil(pool) as u32 + 1;
    let drain_timeout = config.crawler.fetch_timeout() * batches + Duration::from_secs(5);
    if !manager.wait_idle(drain_timeout).await {
        tracing::warn!("Crawl did not drain within {:?}", drain_timeout);
    }

    let status = load_status(
        manager.store().as_ref(),
        Some(manager.tracker().as_ref()),
        Some(manager.stats()),
        manager.clock().now(),
    )?;
    manager.stop().await;

    print_status(&status);

    Ok(())
}

/// Handles the main crawl operation: periodic cycles until interrupted
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    if !config.crawler.enabled {
        tracing::warn!("Crawling is disabled in the configuration; no workers will run");
    }

    tracing::info!(
        "Starting crawler with {} workers, cycle every {}s",
        config.crawler.worker_pool_size,
        config.crawler.cycle_interval_secs
    );

    let manager = build_manager(&config)?;
    manager.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested, stopping crawlers");

    manager.stop().await;

    let stats = manager.stats();
    tracing::info!(
        "Crawler stopped: {} succeeded, {} failed, {} cycles run, {} skipped",
        stats.succeeded,
        stats.failed,
        stats.cycles_run,
        stats.cycles_skipped
    );

    Ok(())
}
