//! HTML parser for link discovery
//!
//! This module handles parsing HTML content to extract:
//! - Pages to follow (from `<a>` tags and canonical links)
//! - Prerequisites needed to render the page (images, scripts, stylesheets, icons)
//! - Page title

use scraper::{Html, Selector};
use url::Url;

/// A URL found while parsing a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredLink {
    pub url: Url,

    /// True for subresources of the page rather than pages to recurse into
    pub is_prerequisite: bool,
}

impl DiscoveredLink {
    pub fn page(url: Url) -> Self {
        Self {
            url,
            is_prerequisite: false,
        }
    }

    pub fn prerequisite(url: Url) -> Self {
        Self {
            url,
            is_prerequisite: true,
        }
    }
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// URL the page was retrieved from
    pub url: Url,

    /// Base for relative links (`<base href>` if present, else `url`)
    pub base_url: Url,

    /// The page title (from `<title>` tag)
    pub title: Option<String>,

    /// All links found on the page, in document order
    pub links: Vec<DiscoveredLink>,
}

/// `(selector, attribute, is_prerequisite)`
const LINK_SOURCES: &[(&str, &str, bool)] = &[
    ("a[href]", "href", false),
    ("area[href]", "href", false),
    ("link[rel='canonical'][href]", "href", false),
    ("img[src]", "src", true),
    ("script[src]", "src", true),
    ("link[rel~='stylesheet'][href]", "href", true),
    ("link[rel~='icon'][href]", "href", true),
];

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Pages:** `<a href>`, `<area href>`, `<link rel="canonical">`
///
/// **Prerequisites:** `<img src>`, `<script src>`,
/// `<link rel="stylesheet">`, `<link rel="icon">`
///
/// **Excluded:** `javascript:`, `mailto:`, `tel:` and `data:` links,
/// fragment-only links, anything not HTTP(S) after resolution
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The URL the page was retrieved from
///
/// # Example
///
/// ```
/// use warc_crawler::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a><img src="a.png"></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &page_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links.len(), 2);
/// assert!(parsed.links[1].is_prerequisite);
/// ```
pub fn parse_html(html: &str, page_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let base_url = extract_base(&document, page_url);
    let title = extract_title(&document);
    let links = extract_links(&document, &base_url);

    ParsedPage {
        url: page_url.clone(),
        base_url,
        title,
        links,
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .unwrap_or_else(|| page_url.clone())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<DiscoveredLink> {
    let mut links = Vec::new();

    for (selector, attribute, is_prerequisite) in LINK_SOURCES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if let Some(url) = element
                .value()
                .attr(attribute)
                .and_then(|value| resolve_link(value, base_url))
            {
                links.push(DiscoveredLink {
                    url,
                    is_prerequisite: *is_prerequisite,
                });
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => {
            Some(absolute_url)
        }
        _ => None,
    }
}
