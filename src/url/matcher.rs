use crate::{UrlError, UrlResult};
use regex::Regex;

/// Checks if a domain matches a wildcard pattern
///
/// This function supports two types of patterns:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches:
///    - "example.com" (the bare domain)
///    - "blog.example.com" (single subdomain)
///    - "api.v2.example.com" (nested subdomains)
///
/// # Arguments
///
/// * `pattern` - The domain pattern, optionally starting with "*."
/// * `candidate` - The domain to check against the pattern
///
/// # Examples
///
/// ```
/// use warc_crawler::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "blog.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Compiles a URL model into an anchored regular expression
///
/// A URL model is a literal URL in which `**` stands for any run of
/// characters and `*` for a non-empty run that contains none of `/`, `?`
/// or `&`.
///
/// # Arguments
///
/// * `model` - The URL model, e.g. `https://example.com/wiki/*`
///
/// # Returns
///
/// * `Ok(Regex)` - Expression matching the whole URL
/// * `Err(UrlError)` - The generated expression was rejected
pub fn compile_url_model(model: &str) -> UrlResult<Regex> {
    let mut expression = String::with_capacity(model.len() + 16);
    expression.push('^');

    let mut chars = model.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                expression.push_str(".*");
            } else {
                expression.push_str(r"[^/\?&]+");
            }
        } else {
            let mut buf = [0u8; 4];
            expression.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        }
    }
    expression.push('$');

    Regex::new(&expression).map_err(|e| UrlError::Pattern {
        pattern: model.to_string(),
        message: e.to_string(),
    })
}

/// Checks if a URL matches a URL model
///
/// # Examples
///
/// ```
/// use warc_crawler::url::matches_url_model;
///
/// assert!(matches_url_model("https://example.com/wiki/*", "https://example.com/wiki/Rust"));
/// assert!(!matches_url_model("https://example.com/wiki/*", "https://example.com/wiki/a/b"));
/// assert!(matches_url_model("https://example.com/**", "https://example.com/a/b?c=d"));
/// ```
pub fn matches_url_model(model: &str, url: &str) -> bool {
    match compile_url_model(model) {
        Ok(regex) => regex.is_match(url),
        Err(e) => {
            tracing::warn!("{}", e);
            false
        }
    }
}
