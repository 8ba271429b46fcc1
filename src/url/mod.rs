//! URL handling: normalization, domain extraction and pattern matching

mod domain;
mod matcher;
mod normalize;

pub use domain::{extract_domain, host_matches_any};
pub use matcher::{compile_url_model, matches_url_model, matches_wildcard};
pub use normalize::{normalize_url, strip_fragment};

/// Returns true if the URL's path ends in one of the given extensions
///
/// Extensions are compared case-insensitively and include the dot.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use warc_crawler::url::has_extension;
///
/// let url = Url::parse("https://example.com/style.CSS?v=2").unwrap();
/// assert!(has_extension(&url, &[".css", ".js"]));
/// ```
pub fn has_extension(url: &::url::Url, extensions: &[&str]) -> bool {
    let path = url.path().to_ascii_lowercase();
    extensions.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::url::Url;

    #[test]
    fn test_has_extension() {
        let url = Url::parse("https://example.com/a/index.htm").unwrap();
        assert!(has_extension(&url, &[".html", ".htm"]));
        assert!(!has_extension(&url, &[".css"]));
    }

    #[test]
    fn test_has_extension_ignores_query() {
        let url = Url::parse("https://example.com/page?file=x.pdf").unwrap();
        assert!(!has_extension(&url, &[".pdf"]));
    }
}
