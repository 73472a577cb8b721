//! Output module for reporting crawler state
//!
//! This module renders what the cache holds and how healthy each node is,
//! for the `--status` and `--once` command line modes.

pub mod status;

pub use status::{load_status, print_status, CrawlStatus, NodeStatus};
