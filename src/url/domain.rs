use crate::url::matches_wildcard;
use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use warc_crawler::url::extract_domain;
///
/// let url = Url::parse("https://Sub.Example.com:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("sub.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns true if the URL's host matches one of the wildcard domain patterns
///
/// # Arguments
///
/// * `url` - The URL to check
/// * `patterns` - Domain patterns as accepted by `matches_wildcard`
pub fn host_matches_any(url: &Url, patterns: &[String]) -> bool {
    match extract_domain(url) {
        Some(domain) => patterns.iter().any(|p| matches_wildcard(p, &domain)),
        None => false,
    }
}
