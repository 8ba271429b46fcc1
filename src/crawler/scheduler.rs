//! Scheduler for managing the crawl frontier
//!
//! This module handles:
//! - Admitting discovered URLs through the site policy
//! - Priority queue management for URLs to crawl
//! - Explicit reconsideration of skipped and failed URLs

use crate::crawler::heap::Heap;
use crate::crawler::policy::{PolicyError, SitePolicy};
use crate::state::{Frontier, UrlRecord, UrlStatus};
use std::sync::Arc;
use url::Url;

/// Scheduler owns the frontier and decides what is fetched next
///
/// Every status change goes through the scheduler, which keeps the heap in
/// step with the frontier. The heap may hold a URL more than once; entries
/// whose URL is no longer `ToCrawl` are discarded on extraction.
pub struct Scheduler {
    frontier: Frontier,
    queue: Heap<String>,
    policy: Arc<dyn SitePolicy>,
}

impl Scheduler {
    /// Creates a scheduler over a loaded frontier
    ///
    /// Every `ToCrawl` URL of the frontier is queued.
    ///
    /// # Arguments
    ///
    /// * `frontier` - The frontier, already repaired by `Frontier::load`
    /// * `policy` - Site policy consulted for every admission
    pub fn new(frontier: Frontier, policy: Arc<dyn SitePolicy>) -> Self {
        let priority = Arc::clone(&policy);
        let mut scheduler = Self {
            frontier,
            queue: Heap::by_key(move |url: &String| priority.priority(url)),
            policy,
        };
        scheduler.rebuild_queue();
        scheduler
    }

    /// Refills the heap from the frontier's `ToCrawl` URLs
    pub fn rebuild_queue(&mut self) {
        self.queue.clear();
        for url in self.frontier.urls_with_status(UrlStatus::ToCrawl) {
            self.queue.add(url);
        }
        tracing::debug!("Queued {} URLs", self.queue.len());
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn frontier_mut(&mut self) -> &mut Frontier {
        &mut self.frontier
    }

    pub fn policy(&self) -> &Arc<dyn SitePolicy> {
        &self.policy
    }

    /// Number of heap entries, stale ones included
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Adds a URL to the crawl
    ///
    /// A new URL is asked to the policy: rejected URLs are stored as
    /// `Skipped`, others as `ToCrawl` and queued. Undecided URLs are queued
    /// too and asked again when dispatched. For a known URL the
    /// prerequisite flag is merged in; a `Skipped` URL is asked again, any
    /// other status is left alone.
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL
    /// * `is_prerequisite` - True if the URL is needed to render a page
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The URL was admitted, skipped or already known
    /// * `Err(PolicyError)` - The policy failed; the crawl must stop
    pub fn add_to_crawl(&mut self, url: &Url, is_prerequisite: bool) -> Result<(), PolicyError> {
        if url.scheme() == "data" {
            return Ok(());
        }
        let Some(url) = self.policy.rewrite_link(url)? else {
            return Ok(());
        };
        let key = url.as_str();

        match self.frontier.record(key) {
            Some(record) => {
                if is_prerequisite && !record.is_prerequisite() {
                    self.frontier.mark_prerequisite(key);
                }
                if record.status() == UrlStatus::Skipped {
                    let is_prerequisite = is_prerequisite || record.is_prerequisite();
                    if self.policy.should_scrape(&url, is_prerequisite)? != Some(false) {
                        tracing::debug!("Re-admitting skipped URL {}", key);
                        self.enqueue(key);
                    }
                }
            }
            None => {
                let status = match self.policy.should_scrape(&url, is_prerequisite)? {
                    Some(false) => UrlStatus::Skipped,
                    _ => UrlStatus::ToCrawl,
                };
                self.frontier
                    .insert(key, UrlRecord::new(status, 0, is_prerequisite));
                if status == UrlStatus::ToCrawl {
                    self.queue.add(key.to_string());
                }
            }
        }
        Ok(())
    }

    /// Extracts the next URL to fetch
    ///
    /// Stale heap entries are dropped along the way. The returned URL is
    /// still `ToCrawl`; the caller marks it `Processing`.
    pub fn next_url(&mut self) -> Option<String> {
        while let Some(url) = self.queue.extract_dominating() {
            if self.frontier.status(&url) == UrlStatus::ToCrawl {
                return Some(url);
            }
        }
        None
    }

    /// Puts a URL back to `ToCrawl` and queues it, whatever its status
    pub fn set_to_try_again(&mut self, url: &str) {
        self.enqueue(url);
    }

    fn enqueue(&mut self, url: &str) {
        self.frontier.set_status(url, UrlStatus::ToCrawl);
        self.queue.add(url.to_string());
    }

    /// Re-admits a single URL
    ///
    /// `Error` and `Skipped` URLs go straight back to `ToCrawl`; anything
    /// else is added as if newly discovered.
    pub fn reconsider(&mut self, url: &Url) -> Result<(), PolicyError> {
        match self.frontier.status(url.as_str()) {
            UrlStatus::Error | UrlStatus::Skipped => {
                self.enqueue(url.as_str());
                Ok(())
            }
            _ => {
                let is_prerequisite = self.frontier.is_prerequisite(url.as_str());
                self.add_to_crawl(url, is_prerequisite)
            }
        }
    }

    /// Asks the policy again about every `Skipped` URL
    ///
    /// # Returns
    ///
    /// The number of URLs queued again
    pub fn reconsider_skipped_urls(&mut self) -> Result<usize, PolicyError> {
        let mut admitted = 0;
        for key in self.frontier.urls_with_status(UrlStatus::Skipped) {
            let Ok(url) = Url::parse(&key) else {
                continue;
            };
            let is_prerequisite = self.frontier.is_prerequisite(&key);
            if self.policy.should_scrape(&url, is_prerequisite)? != Some(false) {
                self.enqueue(&key);
                admitted += 1;
            }
        }
        tracing::info!("Reconsidered skipped URLs: {} queued again", admitted);
        Ok(admitted)
    }

    /// Queues every `Error` URL again, optionally only those matching a
    /// URL model
    pub fn reconsider_failed_urls(&mut self, model: Option<&str>) -> Result<usize, PolicyError> {
        let failed = self.frontier.failed_urls(model)?;
        for url in &failed {
            self.enqueue(url);
        }
        tracing::info!("Reconsidered failed URLs: {} queued again", failed.len());
        Ok(failed.len())
    }

    /// Reconsiders every URL matching a URL model
    ///
    /// Matching `Error` and `Skipped` URLs go back to `ToCrawl`; the others
    /// go through `add_to_crawl`, which leaves finished URLs alone.
    ///
    /// # Returns
    ///
    /// The number of URLs queued again
    pub fn reconsider_for_scraping(&mut self, model: &str) -> Result<usize, PolicyError> {
        let mut queued = 0;
        for key in self.frontier.matching_urls(model)? {
            let Ok(url) = Url::parse(&key) else {
                continue;
            };
            let was_queued = self.frontier.status(&key) == UrlStatus::ToCrawl;
            self.reconsider(&url)?;
            if !was_queued && self.frontier.status(&key) == UrlStatus::ToCrawl {
                queued += 1;
            }
        }
        tracing::info!("Reconsidered {} URLs matching {}", queued, model);
        Ok(queued)
    }
}
