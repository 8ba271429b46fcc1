//! warc-crawler main entry point
//!
//! This is the command-line interface for the archival crawler.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use warc_crawler::archive::ArchiveStore;
use warc_crawler::config::{load_config_with_hash, Config};
use warc_crawler::crawler::Coordinator;
use warc_crawler::output::{load_statistics, print_statistics};
use warc_crawler::state::Frontier;
use warc_crawler::storage::{open_progress_store, DirectoryLock, PROGRESS_FILE_NAME};

/// warc-crawler: a resumable, archival web crawler
///
/// Crawls the configured seeds and stores every HTTP exchange in
/// compressed WARC files with a CDX index. Interrupted crawls resume where
/// they stopped without fetching finished URLs again.
#[derive(Parser, Debug)]
#[command(name = "warc-crawler")]
#[command(version)]
#[command(about = "A resumable, archival web crawler", long_about = None)]
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

    /// Queue every failed URL again before crawling
    #[arg(long)]
    reconsider_failed: bool,

    /// Ask the scope again about every skipped URL before crawling
    #[arg(long)]
    reconsider_skipped: bool,

    /// Queue failed and skipped URLs matching this URL model again
    #[arg(long, value_name = "PATTERN")]
    reconsider: Option<String>,

    /// Rebuild index.cdx from the archive files and exit
    #[arg(long, conflicts_with = "stats")]
    generate_index: bool,

    /// Show statistics from the progress database and exit
    #[arg(long, conflicts_with = "generate_index")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.stats {
        handle_stats(&config)
    } else if cli.generate_index {
        handle_generate_index(&config)
    } else {
        handle_crawl(config, &config_hash, &cli).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warc_crawler=info,warn"),
            1 => EnvFilter::new("warc_crawler=debug,info"),
            2 => EnvFilter::new("warc_crawler=trace,debug"),
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

/// Handles the --stats mode: shows statistics from the progress database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let destination = &config.archive.destination;
    if !destination.join(PROGRESS_FILE_NAME).exists() {
        anyhow::bail!("No crawl progress found in {}", destination.display());
    }

    println!("Destination: {}\n", destination.display());
    let store = open_progress_store(destination)?;
    let frontier = Frontier::load(&store)?;
    print_statistics(&load_statistics(&frontier));

    Ok(())
}

/// Handles the --generate-index mode: rebuilds index.cdx
fn handle_generate_index(config: &Config) -> anyhow::Result<()> {
    let destination = &config.archive.destination;
    let lock = DirectoryLock::acquire(destination)?;

    let mut archive = ArchiveStore::new(
        destination,
        config.archive.max_archive_length,
        env!("CARGO_PKG_NAME"),
    );
    let entries = archive.generate_index()?;
    lock.release()?;

    println!("Indexed {} responses in {}", entries.len(), destination.display());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, cli: &Cli) -> anyhow::Result<()> {
    tracing::info!(
        "Seeds: {}, destination: {}",
        config.scope.seeds.len(),
        config.archive.destination.display()
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after in-flight requests");
            let _ = cancel_tx.send(true);
        }
    });

    let mut coordinator = Coordinator::new(config, cancel_rx)?;
    coordinator.record_config_hash(config_hash);

    coordinator.prepare(|coordinator| {
        if cli.reconsider_failed {
            coordinator.reconsider_failed_urls(None)?;
        }
        if cli.reconsider_skipped {
            coordinator.reconsider_skipped_urls()?;
        }
        if let Some(pattern) = &cli.reconsider {
            coordinator.reconsider_for_scraping(pattern)?;
        }
        Ok(())
    })?;

    // Run the crawler
    match coordinator.run().await {
        Ok(()) => {
            tracing::info!("Crawl finished");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
