//! Integration tests for the catalog crawler

mod adapter_tests;
mod crawl_tests;
