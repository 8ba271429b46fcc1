//! Site policy: which URLs are crawled, how links are rewritten, where
//! responses are archived and in which order URLs are fetched

use crate::config::ScopeConfig;
use crate::crawler::parser::{DiscoveredLink, ParsedPage};
use crate::url::{compile_url_model, has_extension, host_matches_any, strip_fragment};
use crate::{ConfigError, UrlError};
use regex::Regex;
use thiserror::Error;
use url::Url;

/// Errors raised by a site policy
///
/// A policy error aborts the crawl; it is never recorded against a URL.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy failed for {url}: {message}")]
    Failed { url: String, message: String },

    #[error("Invalid URL rule: {0}")]
    Rule(#[from] UrlError),
}

/// What the policy sees of a response when choosing its archive
#[derive(Debug, Clone)]
pub struct ResponseSummary {
    pub status_code: u16,
    pub content_type: Option<String>,
    /// Length of the body as received
    pub length: u64,
}

/// Site-specific crawl decisions
///
/// The scheduler calls into the policy on the coordinator task only.
pub trait SitePolicy: Send + Sync {
    /// Decides whether a URL is crawled
    ///
    /// # Returns
    ///
    /// * `Ok(Some(true))` - Crawl it
    /// * `Ok(Some(false))` - Skip it
    /// * `Ok(None)` - Undecided; queued and asked again when dispatched
    fn should_scrape(&self, url: &Url, is_prerequisite: bool) -> Result<Option<bool>, PolicyError>;

    /// Canonicalizes a URL before it is checked and deduplicated
    ///
    /// Returning `None` drops the link. The default removes fragments that
    /// do not start with `$`.
    fn rewrite_link(&self, url: &Url) -> Result<Option<Url>, PolicyError> {
        let mut url = url.clone();
        strip_fragment(&mut url);
        Ok(Some(url))
    }

    /// Links beyond the ones found by the HTML parser
    fn collect_additional_links(
        &self,
        _url: &Url,
        _page: &ParsedPage,
    ) -> Result<Vec<DiscoveredLink>, PolicyError> {
        Ok(Vec::new())
    }

    /// Archive category for a successful response; `None` skips archiving
    fn destination_warc(
        &self,
        url: &Url,
        response: &ResponseSummary,
    ) -> Result<Option<String>, PolicyError>;

    /// Fetch order; lower values are fetched first
    fn priority(&self, url: &str) -> i64 {
        url.len() as i64
    }
}

/// Default archive category of a response
///
/// Larger than `large_file_threshold` goes to `large`; pages, scripts,
/// stylesheets, JSON and responses without a content type go to `web`;
/// PDFs to `pdf`; everything else to `media`.
pub fn default_destination_warc(
    url: &Url,
    response: &ResponseSummary,
    large_file_threshold: u64,
) -> &'static str {
    if response.length > large_file_threshold {
        return "large";
    }

    let content_type = response
        .content_type
        .as_deref()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let is_web_type = content_type.is_empty()
        || content_type.contains("html")
        || content_type.contains("javascript")
        || content_type.contains("/css");
    if is_web_type || has_extension(url, &[".html", ".htm", ".js", ".css", ".json"]) {
        "web"
    } else if content_type.contains("pdf") {
        "pdf"
    } else {
        "media"
    }
}

/// Policy built from the `[scope]` configuration section
#[derive(Debug)]
pub struct ScopePolicy {
    domains: Vec<String>,
    rules: Vec<Regex>,
    prerequisites_anywhere: bool,
    large_file_threshold: u64,
}

impl ScopePolicy {
    /// Builds the policy
    ///
    /// When no domains are configured, the hosts of the seeds are used.
    pub fn from_config(scope: &ScopeConfig, large_file_threshold: u64) -> Result<Self, ConfigError> {
        let domains = if scope.domains.is_empty() {
            scope
                .seeds
                .iter()
                .filter_map(|seed| Url::parse(seed).ok())
                .filter_map(|url| url.host_str().map(str::to_lowercase))
                .collect()
        } else {
            scope.domains.clone()
        };

        let rules = scope
            .rules
            .iter()
            .map(|rule| {
                compile_url_model(rule).map_err(|e| ConfigError::InvalidRule {
                    rule: rule.clone(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            domains,
            rules,
            prerequisites_anywhere: scope.prerequisites_anywhere,
            large_file_threshold,
        })
    }
}

impl SitePolicy for ScopePolicy {
    fn should_scrape(&self, url: &Url, is_prerequisite: bool) -> Result<Option<bool>, PolicyError> {
        if is_prerequisite && self.prerequisites_anywhere {
            return Ok(Some(true));
        }
        if !host_matches_any(url, &self.domains) {
            return Ok(Some(false));
        }
        if self.rules.is_empty() || is_prerequisite {
            return Ok(Some(true));
        }
        Ok(Some(self.rules.iter().any(|rule| rule.is_match(url.as_str()))))
    }

    fn destination_warc(
        &self,
        url: &Url,
        response: &ResponseSummary,
    ) -> Result<Option<String>, PolicyError> {
        Ok(Some(
            default_destination_warc(url, response, self.large_file_threshold).to_string(),
        ))
    }
}
