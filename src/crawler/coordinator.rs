//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Locking the destination and loading the frontier
//! - Dispatching fetches to worker tasks and collecting their outcomes
//! - Archiving responses and following the links they contain
//! - Periodic persistence and orderly shutdown
//!
//! All mutable state (frontier, heap, archive writers) lives on the
//! coordinator. Workers only fetch; their outcomes come back through a
//! `JoinSet` and are applied here one at a time.

use crate::archive::{is_error_status, ArchiveStore, ArchivedResponse, ExchangeRecord, IndexEntry};
use crate::config::Config;
use crate::crawler::fetcher::{
    describe_status, wait_cancelled, FetchOutcome, FetchedExchange, Fetcher,
};
use crate::crawler::parser::parse_html;
use crate::crawler::policy::{ResponseSummary, ScopePolicy, SitePolicy};
use crate::crawler::scheduler::Scheduler;
use crate::state::{Frontier, UrlStatus};
use crate::storage::{open_progress_store, DirectoryLock, FrontierStore, SqliteFrontierStore};
use crate::url::normalize_url;
use crate::{CrawlError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinSet;
use url::Url;

/// Software named in every warcinfo record
const SOFTWARE: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Progress is logged every this many processed URLs
const PROGRESS_INTERVAL: u64 = 100;

/// Frontier property holding the hash of the configuration file
pub const CONFIG_HASH_PROPERTY: &str = "config-hash";

/// What a worker hands back: the frontier key and the fetch outcome
type WorkerResult = (String, FetchOutcome);

/// A response to act on, fresh from the network or read from the archive
struct ResponseView<'a> {
    status_code: u16,
    content_type: Option<&'a str>,
    location: Option<&'a Url>,
    payload: &'a [u8],
}

impl<'a> From<&'a FetchedExchange> for ResponseView<'a> {
    fn from(exchange: &'a FetchedExchange) -> Self {
        Self {
            status_code: exchange.status_code,
            content_type: exchange.content_type.as_deref(),
            location: exchange.location.as_ref(),
            payload: &exchange.payload,
        }
    }
}

impl<'a> From<&'a ArchivedResponse> for ResponseView<'a> {
    fn from(response: &'a ArchivedResponse) -> Self {
        Self {
            status_code: response.status_code,
            content_type: response.content_type.as_deref(),
            location: response.location.as_ref(),
            payload: &response.payload,
        }
    }
}

fn is_html(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("html"))
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    scheduler: Scheduler,
    store: SqliteFrontierStore,
    archive: ArchiveStore,
    fetcher: Arc<Fetcher>,
    lock: Option<DirectoryLock>,
    cancel: watch::Receiver<bool>,
    in_flight: HashSet<String>,
    processed: u64,
    started: Instant,
}

impl Coordinator {
    /// Creates a coordinator with the policy described by `[scope]`
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `cancel` - Crawl-wide cancellation flag
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - The destination is locked and the frontier loaded
    /// * `Err(CrawlError)` - Failed to initialize
    pub fn new(config: Config, cancel: watch::Receiver<bool>) -> Result<Self> {
        let policy = ScopePolicy::from_config(&config.scope, config.archive.large_file_threshold)?;
        Self::with_policy(config, Arc::new(policy), cancel)
    }

    /// Creates a coordinator with a custom site policy
    ///
    /// This locks the destination directory, opens the progress store and
    /// loads the frontier (repairing interrupted URLs). A fresh store over a
    /// directory that already holds archives is populated from the index.
    /// Seeds are then added like any discovered link.
    pub fn with_policy(
        config: Config,
        policy: Arc<dyn SitePolicy>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Self> {
        let destination = config.archive.destination.clone();
        let lock = DirectoryLock::acquire(&destination)?;

        let store = open_progress_store(&destination)?;
        let frontier = Frontier::load(&store)?;
        let archive = ArchiveStore::new(
            &destination,
            config.archive.max_archive_length,
            SOFTWARE,
        );
        let fetcher = Fetcher::new(&config.user_agent, &config.crawler)?;

        let mut coordinator = Self {
            config: Arc::new(config),
            scheduler: Scheduler::new(frontier, policy),
            store,
            archive,
            fetcher: Arc::new(fetcher),
            lock: Some(lock),
            cancel,
            in_flight: HashSet::new(),
            processed: 0,
            started: Instant::now(),
        };

        if coordinator.store.is_new() && coordinator.archive.has_archives()? {
            coordinator.populate_from_archives()?;
        }

        let seeds = coordinator.config.scope.seeds.clone();
        for seed in &seeds {
            let url = normalize_url(seed)?;
            coordinator.scheduler.add_to_crawl(&url, false)?;
        }

        Ok(coordinator)
    }

    pub fn frontier(&self) -> &Frontier {
        self.scheduler.frontier()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Records the configuration hash, warning when it changed since the
    /// previous run over this destination
    pub fn record_config_hash(&mut self, hash: &str) {
        let frontier = self.scheduler.frontier_mut();
        match frontier.property(CONFIG_HASH_PROPERTY) {
            Some(previous) if previous != hash => {
                tracing::warn!(
                    "Configuration changed since the last run ({} -> {})",
                    previous,
                    hash
                );
            }
            _ => {}
        }
        frontier.set_property(CONFIG_HASH_PROPERTY, hash);
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.scheduler.frontier().property(key)
    }

    pub fn set_property(&mut self, key: &str, value: &str) {
        self.scheduler.frontier_mut().set_property(key, value);
    }

    /// Adds a URL to the crawl through the site policy
    pub fn add_to_crawl(&mut self, url: &Url, is_prerequisite: bool) -> Result<()> {
        Ok(self.scheduler.add_to_crawl(url, is_prerequisite)?)
    }

    pub fn set_to_try_again(&mut self, url: &str) {
        self.scheduler.set_to_try_again(url);
    }

    /// Signals that a crawled page was processed further by an external
    /// renderer
    ///
    /// Only `Crawled` pages can be promoted; returns false for any other
    /// status.
    pub fn set_dom_emulated(&mut self, url: &str) -> bool {
        let promoted = self.scheduler.frontier_mut().set_dom_emulated(url);
        if !promoted {
            tracing::warn!(
                "Cannot mark {} as DOM-emulated while it is {}",
                url,
                self.scheduler.frontier().status(url).as_str()
            );
        }
        promoted
    }

    pub fn reconsider_skipped_urls(&mut self) -> Result<usize> {
        Ok(self.scheduler.reconsider_skipped_urls()?)
    }

    pub fn reconsider_failed_urls(&mut self, model: Option<&str>) -> Result<usize> {
        Ok(self.scheduler.reconsider_failed_urls(model)?)
    }

    pub fn reconsider_for_scraping(&mut self, model: &str) -> Result<usize> {
        Ok(self.scheduler.reconsider_for_scraping(model)?)
    }

    /// Index entry of the archived response for `url`
    pub fn try_get_cached(&mut self, url: &str) -> Result<Option<IndexEntry>> {
        Ok(self.archive.try_get_cached(url)?)
    }

    /// Archived response for `url`, with its payload decoded
    pub fn open_cached(&mut self, url: &str) -> Result<Option<ArchivedResponse>> {
        Ok(self.archive.open_cached(url)?)
    }

    /// Closes the open archives and rebuilds `index.cdx` from scratch
    ///
    /// # Returns
    ///
    /// The number of indexed responses
    pub fn generate_index(&mut self) -> Result<usize> {
        Ok(self.archive.generate_index()?.len())
    }

    /// Rebuilds the frontier from the responses already archived
    ///
    /// Error responses become `Error`; the others are handled as if they
    /// had just been fetched, which follows their redirects and links.
    fn populate_from_archives(&mut self) -> Result<()> {
        let mut entries: Vec<IndexEntry> = self.archive.index()?.values().cloned().collect();
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        tracing::info!(
            "Populating the frontier from {} archived responses",
            entries.len()
        );

        for entry in entries {
            let Ok(url) = Url::parse(&entry.url) else {
                tracing::warn!("Ignoring archived response with invalid URL {}", entry.url);
                continue;
            };
            let status_code = entry.http_status.unwrap_or(0);
            if is_error_status(status_code) {
                self.scheduler
                    .frontier_mut()
                    .set_result(&entry.url, UrlStatus::Error, status_code);
                continue;
            }
            let response = self.archive.open_entry(&entry)?;
            self.handle_response(&entry.url, &url, &ResponseView::from(&response))?;
        }

        tracing::info!(
            "Frontier holds {} URLs after populating",
            self.scheduler.frontier().len()
        );
        Ok(())
    }

    /// Runs start-up work such as reconsidering URLs, shutting down if it
    /// fails
    ///
    /// The error from `setup` takes precedence over one from the shutdown.
    pub fn prepare<F>(&mut self, setup: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let result = setup(self);
        if let Err(e) = &result {
            tracing::error!("Start-up failed: {}", e);
            if let Err(shutdown) = self.shutdown() {
                tracing::error!("Shutdown after a failed start also failed: {}", shutdown);
            }
        }
        result
    }

    /// Runs the crawl until the frontier is exhausted or the crawl is
    /// cancelled, then shuts down
    ///
    /// Shutdown always runs: archives are closed (appending their index
    /// rows), the frontier is saved and the destination unlocked. A fatal
    /// error from the crawl takes precedence over one from the shutdown.
    pub async fn run(&mut self) -> Result<()> {
        let result = self.crawl().await;
        let closed = self.shutdown();
        match (result, closed) {
            (Err(e), Err(shutdown)) => {
                tracing::error!("Shutdown after a failed crawl also failed: {}", shutdown);
                Err(e)
            }
            (result, closed) => result.and(closed),
        }
    }

    async fn crawl(&mut self) -> Result<()> {
        let parallelism = self.config.crawler.parallelism.max(1) as usize;
        let mut tasks: JoinSet<WorkerResult> = JoinSet::new();
        self.started = Instant::now();

        tracing::info!(
            "Starting crawl: {} URLs known, {} queued",
            self.scheduler.frontier().len(),
            self.scheduler.queued()
        );

        loop {
            while tasks.len() < parallelism && !*self.cancel.borrow() {
                let Some(url) = self.scheduler.next_url() else {
                    break;
                };
                self.dispatch(url, &mut tasks)?;
                self.save_if_due()?;
            }

            // Workers see the cancellation themselves and come back quickly.
            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let (url, outcome) = joined.map_err(|e| CrawlError::Worker(e.to_string()))?;
            self.complete(url, outcome)?;
            self.save_if_due()?;
        }

        if *self.cancel.borrow() {
            tracing::info!("Crawl cancelled after {} URLs", self.processed);
        } else {
            tracing::info!(
                "Frontier is empty, crawl complete: {} URLs processed in {:?}",
                self.processed,
                self.started.elapsed()
            );
        }
        Ok(())
    }

    /// Takes a URL out of the queue and starts working on it
    ///
    /// The policy is asked again and the link rewritten; a URL that is
    /// already archived is served from the archive when reuse is on.
    /// Anything else is handed to a worker.
    fn dispatch(&mut self, key: String, tasks: &mut JoinSet<WorkerResult>) -> Result<()> {
        self.scheduler
            .frontier_mut()
            .set_status(&key, UrlStatus::Processing);

        let Ok(url) = Url::parse(&key) else {
            tracing::warn!("Skipping unparseable URL {}", key);
            self.scheduler.frontier_mut().set_status(&key, UrlStatus::Skipped);
            return Ok(());
        };

        let policy = Arc::clone(self.scheduler.policy());
        let is_prerequisite = self.scheduler.frontier().is_prerequisite(&key);
        if policy.should_scrape(&url, is_prerequisite)? == Some(false) {
            tracing::debug!("Skipping {}", key);
            self.scheduler.frontier_mut().set_status(&key, UrlStatus::Skipped);
            return Ok(());
        }

        match policy.rewrite_link(&url)? {
            Some(rewritten) if rewritten == url => {}
            Some(rewritten) => {
                tracing::debug!("Rewrote {} to {}", key, rewritten);
                self.scheduler.frontier_mut().set_status(&key, UrlStatus::Skipped);
                self.scheduler.add_to_crawl(&rewritten, is_prerequisite)?;
                return Ok(());
            }
            None => {
                self.scheduler.frontier_mut().set_status(&key, UrlStatus::Skipped);
                return Ok(());
            }
        }

        if self.config.crawler.reuse_archived {
            if let Some(response) = self.archive.open_cached(&key)? {
                tracing::debug!("Serving {} from the archive", key);
                self.handle_response(&key, &url, &ResponseView::from(&response))?;
                self.count_processed();
                return Ok(());
            }
        }

        let fetcher = Arc::clone(&self.fetcher);
        let mut cancel = self.cancel.clone();
        let delay = Duration::from_millis(self.config.crawler.inter_request_delay_ms);
        let error_delay = Duration::from_millis(self.config.crawler.error_delay_ms);

        self.in_flight.insert(key.clone());
        tasks.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = wait_cancelled(&mut cancel) => return (key, FetchOutcome::Cancelled),
                }
            }
            let outcome = fetcher.fetch(&url, &mut cancel).await;
            if outcome.is_error() && !error_delay.is_zero() {
                tokio::time::sleep(error_delay).await;
            }
            (key, outcome)
        });
        Ok(())
    }

    /// Applies a worker's outcome
    fn complete(&mut self, key: String, outcome: FetchOutcome) -> Result<()> {
        self.in_flight.remove(&key);
        match outcome {
            FetchOutcome::Cancelled => {
                self.scheduler.set_to_try_again(&key);
                return Ok(());
            }
            FetchOutcome::Failed(error) => {
                tracing::warn!("Failed {}: {}", key, describe_status(error.code()));
                self.scheduler
                    .frontier_mut()
                    .set_result(&key, UrlStatus::Error, error.code());
            }
            FetchOutcome::Fetched(exchange) => self.handle_fetched(&key, exchange)?,
        }
        self.count_processed();
        Ok(())
    }

    /// Archives a fresh response, then acts on it
    ///
    /// Error statuses are recorded and never archived.
    fn handle_fetched(&mut self, key: &str, exchange: FetchedExchange) -> Result<()> {
        if is_error_status(exchange.status_code) {
            tracing::warn!("Failed {}: {}", key, describe_status(exchange.status_code));
            self.scheduler
                .frontier_mut()
                .set_result(key, UrlStatus::Error, exchange.status_code);
            return Ok(());
        }

        let summary = ResponseSummary {
            status_code: exchange.status_code,
            content_type: exchange.content_type.clone(),
            length: exchange.body_length,
        };
        let policy = Arc::clone(self.scheduler.policy());
        if let Some(category) = policy.destination_warc(&exchange.url, &summary)? {
            self.archive.write_exchange(
                &category,
                &ExchangeRecord {
                    url: exchange.url.as_str(),
                    request: &exchange.request,
                    response: &exchange.response,
                    request_date: exchange.request_date,
                    response_date: exchange.response_date,
                    ip_address: &exchange.ip_address,
                },
            )?;
        }

        self.handle_response(key, &exchange.url, &ResponseView::from(&exchange))
    }

    /// Sets the final status of a URL from its response and queues what
    /// the response points at
    ///
    /// A `Location` header makes the URL a `Redirect` whatever the status
    /// code. HTML pages are parsed for links and become `Crawled`; anything
    /// else is `Downloaded`.
    fn handle_response(&mut self, key: &str, url: &Url, response: &ResponseView<'_>) -> Result<()> {
        let status_code = response.status_code;
        if is_error_status(status_code) {
            self.scheduler
                .frontier_mut()
                .set_result(key, UrlStatus::Error, status_code);
            return Ok(());
        }

        let is_prerequisite = self.scheduler.frontier().is_prerequisite(key);

        if let Some(target) = response.location {
            tracing::debug!("{} redirects to {}", key, target);
            self.scheduler
                .frontier_mut()
                .set_result(key, UrlStatus::Redirect, status_code);
            self.scheduler.add_to_crawl(target, is_prerequisite)?;
            return Ok(());
        }

        if !is_html(response.content_type) {
            self.scheduler
                .frontier_mut()
                .set_result(key, UrlStatus::Downloaded, status_code);
            return Ok(());
        }

        let html = String::from_utf8_lossy(response.payload);
        let page = parse_html(&html, url);
        let policy = Arc::clone(self.scheduler.policy());
        let additional = policy.collect_additional_links(url, &page)?;

        self.scheduler
            .frontier_mut()
            .set_result(key, UrlStatus::Crawled, status_code);
        tracing::debug!(
            "Crawled {} ({} links, {} additional)",
            key,
            page.links.len(),
            additional.len()
        );

        for link in page.links.iter().chain(additional.iter()) {
            self.scheduler.add_to_crawl(&link.url, link.is_prerequisite)?;
        }
        Ok(())
    }

    fn count_processed(&mut self) {
        self.processed += 1;
        if self.processed % PROGRESS_INTERVAL == 0 {
            let rate = self.processed as f64 / self.started.elapsed().as_secs_f64().max(0.001);
            tracing::info!(
                "Progress: {} URLs processed, {} queued, {} in flight, {:.2} URLs/sec",
                self.processed,
                self.scheduler.queued(),
                self.in_flight.len(),
                rate
            );
        }
    }

    fn save_if_due(&mut self) -> Result<()> {
        let crawler = &self.config.crawler;
        let due = self.scheduler.frontier().should_save(
            crawler.save_threshold,
            Duration::from_secs(crawler.save_interval_secs),
        );
        if due {
            self.save()?;
        }
        Ok(())
    }

    /// Writes pending frontier changes to the progress store
    pub fn save(&mut self) -> Result<()> {
        let saved = self.scheduler.frontier_mut().flush(&mut self.store)?;
        tracing::debug!("Saved {} frontier changes", saved);
        Ok(())
    }

    /// Closes archives, saves the frontier and unlocks the destination
    ///
    /// URLs still in flight go back to `ToCrawl` first. Safe to call more
    /// than once.
    pub fn shutdown(&mut self) -> Result<()> {
        let interrupted: Vec<String> = self.in_flight.drain().collect();
        for url in &interrupted {
            self.scheduler.set_to_try_again(url);
        }
        if !interrupted.is_empty() {
            tracing::info!("Returned {} interrupted URLs to the queue", interrupted.len());
        }

        self.archive.close_writers()?;
        self.save()?;

        if let Some(lock) = self.lock.take() {
            lock.release()?;
            tracing::info!(
                "Closed {} ({} URLs known)",
                self.archive.directory().display(),
                self.scheduler.frontier().len()
            );
        }
        Ok(())
    }
}
