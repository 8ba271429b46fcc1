//! Output module for crawl reports
//!
//! This module handles summarizing a frontier into per-status statistics
//! and printing them.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
