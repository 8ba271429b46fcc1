//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with wire-exact reconstruction of each exchange
//! - HTML parsing and link extraction
//! - The site policy deciding scope, rewriting and archive categories
//! - The priority heap and scheduler over the frontier
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod heap;
mod parser;
mod policy;
mod pool;
mod scheduler;

pub use coordinator::{Coordinator, CONFIG_HASH_PROPERTY};
pub use fetcher::{
    build_http_client, describe_status, FetchOutcome, FetchedExchange, Fetcher, TransportError,
};
pub use heap::Heap;
pub use parser::{parse_html, resolve_link, DiscoveredLink, ParsedPage};
pub use policy::{default_destination_warc, PolicyError, ResponseSummary, ScopePolicy, SitePolicy};
pub use pool::{BufferPool, PooledBuffer};
pub use scheduler::Scheduler;

use crate::config::Config;
use tokio::sync::watch;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Lock the destination and load the frontier
/// 2. Queue the seeds
/// 3. Fetch, archive and follow links until the frontier is exhausted
/// 4. Close the archives and save the frontier
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `cancel` - Crawl-wide cancellation flag
///
/// # Example
///
/// ```no_run
/// use warc_crawler::config::load_config;
/// use warc_crawler::crawler::crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let (_tx, rx) = tokio::sync::watch::channel(false);
/// crawl(config, rx).await?;
/// # Ok(())
/// # }
/// ```
pub async fn crawl(config: Config, cancel: watch::Receiver<bool>) -> crate::Result<()> {
    let mut coordinator = Coordinator::new(config, cancel)?;
    coordinator.run().await
}
