//! Statistics generation from the crawl frontier
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from a loaded frontier.

use crate::crawler::describe_status;
use crate::state::{Frontier, UrlStatus};
use crate::url::extract_domain;
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Total number of URLs known to the frontier
    pub total_urls: u64,

    /// Count of URLs by status
    pub urls_by_status: BTreeMap<UrlStatus, u64>,

    /// URLs flagged as prerequisites of some page
    pub prerequisites: u64,

    /// Number of unique hosts encountered
    pub unique_domains: u64,

    /// Failed URLs per recorded status code
    pub error_summary: BTreeMap<u16, u64>,
}

impl CrawlStatistics {
    pub fn count(&self, status: UrlStatus) -> u64 {
        self.urls_by_status.get(&status).copied().unwrap_or(0)
    }

    /// URLs whose content was retrieved (`Crawled`, `DomEmulated`,
    /// `Downloaded`)
    pub fn retrieved(&self) -> u64 {
        self.urls_by_status
            .iter()
            .filter(|(status, _)| status.is_scraped(false))
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics from a frontier
///
/// # Arguments
///
/// * `frontier` - The frontier to summarize
pub fn load_statistics(frontier: &Frontier) -> CrawlStatistics {
    let mut stats = CrawlStatistics {
        total_urls: frontier.len() as u64,
        ..CrawlStatistics::default()
    };

    for (status, count) in frontier.counts() {
        stats.urls_by_status.insert(status, count as u64);
    }

    let mut domains = HashSet::new();
    for (url, record) in frontier.iter() {
        if record.is_prerequisite() {
            stats.prerequisites += 1;
        }
        if record.status() == UrlStatus::Error {
            *stats.error_summary.entry(record.http_status()).or_insert(0) += 1;
        }
        if let Some(host) = Url::parse(url).ok().as_ref().and_then(extract_domain) {
            domains.insert(host);
        }
    }
    stats.unique_domains = domains.len() as u64;

    stats
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total URLs known: {}", stats.total_urls);
    println!("  Prerequisites: {}", stats.prerequisites);
    println!("  Unique domains: {}", stats.unique_domains);
    println!();

    println!("URLs by Status:");
    // Sort statuses by count (descending)
    let mut status_counts: Vec<_> = stats.urls_by_status.iter().collect();
    status_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (status, count) in status_counts {
        let percentage = if stats.total_urls > 0 {
            (*count as f64 / stats.total_urls as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.error_summary.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (code, count) in error_counts {
            println!("  {}: {}", describe_status(*code), count);
        }
        println!();
    }

    let retrieved = stats.retrieved();
    let success_rate = if stats.total_urls > 0 {
        (retrieved as f64 / stats.total_urls as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} URLs retrieved)",
        success_rate, retrieved, stats.total_urls
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UrlRecord;

    #[test]
    fn test_load_statistics() {
        let mut frontier = Frontier::new();
        frontier.insert("https://example.com/", UrlRecord::new(UrlStatus::Crawled, 200, false));
        frontier.insert("https://example.com/a.png", UrlRecord::new(UrlStatus::Downloaded, 200, true));
        frontier.insert("https://cdn.example.net/x.js", UrlRecord::new(UrlStatus::Error, 802, true));
        frontier.insert("https://example.com/gone", UrlRecord::new(UrlStatus::Error, 404, false));
        frontier.insert("https://example.com/next", UrlRecord::new(UrlStatus::ToCrawl, 0, false));

        let stats = load_statistics(&frontier);
        assert_eq!(stats.total_urls, 5);
        assert_eq!(stats.count(UrlStatus::Error), 2);
        assert_eq!(stats.count(UrlStatus::Skipped), 0);
        assert_eq!(stats.prerequisites, 2);
        assert_eq!(stats.unique_domains, 2);
        assert_eq!(stats.retrieved(), 2);
        assert_eq!(stats.error_summary.get(&802), Some(&1));
        assert_eq!(stats.error_summary.get(&404), Some(&1));
    }

    #[test]
    fn test_empty_frontier() {
        let stats = load_statistics(&Frontier::new());
        assert_eq!(stats.total_urls, 0);
        assert_eq!(stats.retrieved(), 0);
        assert!(stats.error_summary.is_empty());
    }
}
