//! In-memory frontier with buffered persistence
//!
//! The frontier maps every known URL to its packed `UrlRecord`. Changes are
//! tracked as dirty keys and written to a `FrontierStore` in one batch by
//! `flush`, so a crash loses at most the unflushed tail. Anything left in
//! `Processing` by such a crash is put back to `ToCrawl` on load.

use crate::state::{UrlRecord, UrlStatus};
use crate::storage::{FrontierStore, StorageResult};
use crate::url::compile_url_model;
use crate::UrlResult;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Known URLs and their crawl state
pub struct Frontier {
    records: HashMap<String, UrlRecord>,
    properties: HashMap<String, String>,
    dirty_urls: HashSet<String>,
    dirty_properties: HashSet<String>,
    last_save: Instant,
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontier {
    /// Creates an empty frontier
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            properties: HashMap::new(),
            dirty_urls: HashSet::new(),
            dirty_properties: HashSet::new(),
            last_save: Instant::now(),
        }
    }

    /// Loads a frontier from a store, repairing interrupted entries
    ///
    /// Every URL persisted as `Processing` is reset to `ToCrawl` and marked
    /// dirty so that the repair itself is saved on the next flush.
    pub fn load(store: &dyn FrontierStore) -> StorageResult<Self> {
        let mut frontier = Self::new();
        frontier.properties = store.load_properties()?;

        let mut repaired = 0usize;
        for (url, word) in store.load_urls()? {
            let mut record = UrlRecord::from_word(word);
            if record.status() == UrlStatus::Processing {
                record = record.with_status(UrlStatus::ToCrawl);
                frontier.dirty_urls.insert(url.clone());
                repaired += 1;
            }
            frontier.records.insert(url, record);
        }

        tracing::info!(
            "Loaded {} URLs and {} properties from the progress store",
            frontier.records.len(),
            frontier.properties.len()
        );
        if repaired > 0 {
            tracing::info!("Reset {} interrupted URLs to to_crawl", repaired);
        }
        Ok(frontier)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, url: &str) -> Option<UrlRecord> {
        self.records.get(url).copied()
    }

    /// Status of a URL; `UnknownUrl` if it was never added
    pub fn status(&self, url: &str) -> UrlStatus {
        self.record(url)
            .map_or(UrlStatus::UnknownUrl, |record| record.status())
    }

    /// Last HTTP status (or transport error code) seen for a URL, 0 if none
    pub fn http_status(&self, url: &str) -> u16 {
        self.record(url).map_or(0, |record| record.http_status())
    }

    pub fn is_prerequisite(&self, url: &str) -> bool {
        self.record(url).is_some_and(|record| record.is_prerequisite())
    }

    /// Stores a record as is
    pub fn insert(&mut self, url: &str, record: UrlRecord) {
        self.records.insert(url.to_string(), record);
        self.mark_dirty(url);
    }

    /// Changes the status of a URL, keeping its other fields
    ///
    /// `DomEmulated` is never downgraded to `Crawled`.
    pub fn set_status(&mut self, url: &str, status: UrlStatus) {
        let current = self.record(url).unwrap_or_default();
        if status == UrlStatus::Crawled && current.status() == UrlStatus::DomEmulated {
            return;
        }
        self.insert(url, current.with_status(status));
    }

    /// Records the outcome of a fetch
    pub fn set_result(&mut self, url: &str, status: UrlStatus, http_status: u16) {
        let current = self.record(url).unwrap_or_default();
        let status = if status == UrlStatus::Crawled && current.status() == UrlStatus::DomEmulated
        {
            UrlStatus::DomEmulated
        } else {
            status
        };
        self.insert(url, current.with_status(status).with_http_status(http_status));
    }

    /// Flags a URL as a prerequisite of some page
    pub fn mark_prerequisite(&mut self, url: &str) {
        if let Some(record) = self.record(url) {
            if !record.is_prerequisite() {
                self.insert(url, record.with_prerequisite(true));
            }
        }
    }

    /// Promotes a `Crawled` URL to `DomEmulated`
    ///
    /// Returns false, changing nothing, unless the URL is `Crawled` or
    /// already `DomEmulated`.
    pub fn set_dom_emulated(&mut self, url: &str) -> bool {
        match self.status(url) {
            UrlStatus::DomEmulated => true,
            UrlStatus::Crawled => {
                self.set_status(url, UrlStatus::DomEmulated);
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, UrlRecord)> {
        self.records.iter().map(|(url, record)| (url.as_str(), *record))
    }

    /// URLs currently in `status`, sorted
    pub fn urls_with_status(&self, status: UrlStatus) -> Vec<String> {
        let mut urls: Vec<String> = self
            .iter()
            .filter(|(_, record)| record.status() == status)
            .map(|(url, _)| url.to_string())
            .collect();
        urls.sort();
        urls
    }

    /// Known URLs matching a URL model, sorted
    pub fn matching_urls(&self, model: &str) -> UrlResult<Vec<String>> {
        let regex = compile_url_model(model)?;
        let mut urls: Vec<String> = self
            .records
            .keys()
            .filter(|url| regex.is_match(url))
            .cloned()
            .collect();
        urls.sort();
        Ok(urls)
    }

    /// URLs in `Error`, optionally limited to a URL model, sorted
    pub fn failed_urls(&self, model: Option<&str>) -> UrlResult<Vec<String>> {
        let regex = model.map(compile_url_model).transpose()?;
        let mut urls: Vec<String> = self
            .iter()
            .filter(|(_, record)| record.status() == UrlStatus::Error)
            .filter(|(url, _)| regex.as_ref().map_or(true, |r| r.is_match(url)))
            .map(|(url, _)| url.to_string())
            .collect();
        urls.sort();
        Ok(urls)
    }

    /// URLs whose content was retrieved, sorted
    ///
    /// With `html_only`, downloaded non-page resources are left out.
    pub fn scraped_urls(&self, html_only: bool) -> Vec<String> {
        let mut urls: Vec<String> = self
            .iter()
            .filter(|(_, record)| record.status().is_scraped(html_only))
            .map(|(url, _)| url.to_string())
            .collect();
        urls.sort();
        urls
    }

    pub fn count(&self, status: UrlStatus) -> usize {
        self.records
            .values()
            .filter(|record| record.status() == status)
            .count()
    }

    /// Number of URLs per status
    pub fn counts(&self) -> BTreeMap<UrlStatus, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            *counts.entry(record.status()).or_insert(0) += 1;
        }
        counts
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: &str, value: &str) {
        if self.property(key) == Some(value) {
            return;
        }
        self.properties.insert(key.to_string(), value.to_string());
        self.dirty_properties.insert(key.to_string());
    }

    fn mark_dirty(&mut self, url: &str) {
        if !self.dirty_urls.contains(url) {
            self.dirty_urls.insert(url.to_string());
        }
    }

    /// Number of changes not yet written to the store
    pub fn pending_changes(&self) -> usize {
        self.dirty_urls.len() + self.dirty_properties.len()
    }

    /// Returns true when the pending changes should be written out
    ///
    /// # Arguments
    ///
    /// * `threshold` - Flush once this many changes are pending
    /// * `interval` - Flush once this much time passed since the last save
    pub fn should_save(&self, threshold: usize, interval: Duration) -> bool {
        let pending = self.pending_changes();
        pending > 0 && (pending >= threshold || self.last_save.elapsed() >= interval)
    }

    /// Writes pending changes to the store
    ///
    /// # Returns
    ///
    /// The number of URLs written
    pub fn flush(&mut self, store: &mut dyn FrontierStore) -> StorageResult<usize> {
        let urls: Vec<(String, u16)> = self
            .dirty_urls
            .iter()
            .filter_map(|url| self.records.get(url).map(|r| (url.clone(), r.word())))
            .collect();
        let properties: Vec<(String, String)> = self
            .dirty_properties
            .iter()
            .filter_map(|key| self.properties.get(key).map(|v| (key.clone(), v.clone())))
            .collect();

        if !urls.is_empty() || !properties.is_empty() {
            store.save(&urls, &properties)?;
            tracing::debug!(
                "Saved {} URLs and {} properties",
                urls.len(),
                properties.len()
            );
        }

        self.dirty_urls.clear();
        self.dirty_properties.clear();
        self.last_save = Instant::now();
        Ok(urls.len())
    }
}
