use crate::UrlError;
use url::Url;

/// Normalizes a URL before it enters the frontier
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not HTTP or HTTPS
/// 3. Reject URLs without a host
/// 4. Remove the fragment, unless it starts with `$` (such fragments select
///    content and are part of the resource identity)
///
/// Host case and default ports are already canonicalized by the parser.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse or normalize the URL
///
/// # Examples
///
/// ```
/// use warc_crawler::url::normalize_url;
///
/// let url = normalize_url("http://EXAMPLE.COM/page#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    strip_fragment(&mut url);
    Ok(url)
}

/// Removes a URL's fragment unless it starts with `$`
///
/// Returns true if the URL was changed.
pub fn strip_fragment(url: &mut Url) -> bool {
    match url.fragment() {
        Some(fragment) if !fragment.starts_with('$') => {
            url.set_fragment(None);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme() {
        let result = normalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_lowercase_host() {
        let result = normalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_empty_path_becomes_root() {
        let result = normalize_url("https://example.com").unwrap();
        assert_eq!(result.as_str(), "https://example.com/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_keep_dollar_fragment() {
        let result = normalize_url("https://example.com/app#$state=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/app#$state=1");
    }

    #[test]
    fn test_query_is_untouched() {
        let result = normalize_url("https://example.com/s?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/s?b=2&a=1");
    }

    #[test]
    fn test_invalid_scheme() {
        assert!(matches!(
            normalize_url("ftp://example.com/file"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(matches!(
            normalize_url("data:text/plain,hello"),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(normalize_url("not a url"), Err(UrlError::Parse(_))));
    }

    #[test]
    fn test_strip_fragment_reports_change() {
        let mut url = Url::parse("https://example.com/#a").unwrap();
        assert!(strip_fragment(&mut url));
        assert!(!strip_fragment(&mut url));
    }
}
