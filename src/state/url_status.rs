/// Crawl status of a URL and its packed 16-bit representation
///
/// Every URL in the frontier is stored as a single `u16`:
///
/// * bits 0..=9 - last HTTP status (or synthetic transport error code)
/// * bit 10 - prerequisite flag
/// * bits 11..=14 - status kind
use std::fmt;

const HTTP_STATUS_MASK: u16 = 0x03FF;
const PREREQUISITE_FLAG: u16 = 1 << 10;
const STATUS_SHIFT: u16 = 11;
const STATUS_MASK: u16 = 0x0F << STATUS_SHIFT;

/// Represents where a URL is in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UrlStatus {
    /// Queued, waiting to be fetched
    ToCrawl = 0,

    /// Fetched as a page and its links were followed
    Crawled = 1,

    /// Rejected by the site policy
    Skipped = 2,

    /// A fetch is in flight. Never valid at rest.
    Processing = 3,

    /// Fetch failed (HTTP error status or transport error)
    Error = 4,

    /// Response carried a `Location`; the target was queued instead
    Redirect = 5,

    /// Fetched and archived, but not parsed for links
    Downloaded = 6,

    /// Not in the frontier. Never stored.
    UnknownUrl = 7,

    /// Crawled and then processed further by an external renderer
    DomEmulated = 8,

    /// Retrieved through some other channel and not parsed yet
    RetrievedButNotCrawled = 9,
}

impl UrlStatus {
    fn from_kind(kind: u16) -> Self {
        match kind {
            0 => Self::ToCrawl,
            1 => Self::Crawled,
            2 => Self::Skipped,
            3 => Self::Processing,
            4 => Self::Error,
            5 => Self::Redirect,
            6 => Self::Downloaded,
            8 => Self::DomEmulated,
            9 => Self::RetrievedButNotCrawled,
            _ => Self::UnknownUrl,
        }
    }

    /// Returns true once a URL no longer needs any work
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::ToCrawl | Self::Processing | Self::UnknownUrl)
    }

    /// Returns true if the URL's content was retrieved successfully
    pub fn is_scraped(&self, html_only: bool) -> bool {
        match self {
            Self::Crawled | Self::DomEmulated => true,
            Self::Downloaded => !html_only,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToCrawl => "to_crawl",
            Self::Crawled => "crawled",
            Self::Skipped => "skipped",
            Self::Processing => "processing",
            Self::Error => "error",
            Self::Redirect => "redirect",
            Self::Downloaded => "downloaded",
            Self::UnknownUrl => "unknown_url",
            Self::DomEmulated => "dom_emulated",
            Self::RetrievedButNotCrawled => "retrieved_but_not_crawled",
        }
    }

    /// Returns all statuses a stored URL can have
    pub fn stored_statuses() -> Vec<Self> {
        vec![
            Self::ToCrawl,
            Self::Crawled,
            Self::Skipped,
            Self::Processing,
            Self::Error,
            Self::Redirect,
            Self::Downloaded,
            Self::DomEmulated,
            Self::RetrievedButNotCrawled,
        ]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Packed state of one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UrlRecord(u16);

impl UrlRecord {
    /// Packs a status, HTTP status and prerequisite flag
    ///
    /// HTTP codes that do not fit in ten bits are clamped.
    pub fn new(status: UrlStatus, http_status: u16, is_prerequisite: bool) -> Self {
        Self(0)
            .with_status(status)
            .with_http_status(http_status)
            .with_prerequisite(is_prerequisite)
    }

    pub fn from_word(word: u16) -> Self {
        Self(word)
    }

    pub fn word(self) -> u16 {
        self.0
    }

    pub fn status(self) -> UrlStatus {
        UrlStatus::from_kind((self.0 & STATUS_MASK) >> STATUS_SHIFT)
    }

    pub fn http_status(self) -> u16 {
        self.0 & HTTP_STATUS_MASK
    }

    pub fn is_prerequisite(self) -> bool {
        self.0 & PREREQUISITE_FLAG != 0
    }

    pub fn with_status(self, status: UrlStatus) -> Self {
        Self((self.0 & !STATUS_MASK) | ((status as u16) << STATUS_SHIFT))
    }

    pub fn with_http_status(self, http_status: u16) -> Self {
        Self((self.0 & !HTTP_STATUS_MASK) | http_status.min(HTTP_STATUS_MASK))
    }

    pub fn with_prerequisite(self, is_prerequisite: bool) -> Self {
        if is_prerequisite {
            Self(self.0 | PREREQUISITE_FLAG)
        } else {
            Self(self.0 & !PREREQUISITE_FLAG)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_are_independent() {
        let record = UrlRecord::new(UrlStatus::Redirect, 301, true);
        assert_eq!(record.status(), UrlStatus::Redirect);
        assert_eq!(record.http_status(), 301);
        assert!(record.is_prerequisite());

        let record = record.with_http_status(200);
        assert_eq!(record.status(), UrlStatus::Redirect);
        assert!(record.is_prerequisite());

        let record = record.with_prerequisite(false).with_status(UrlStatus::Crawled);
        assert_eq!(record.http_status(), 200);
        assert!(!record.is_prerequisite());
        assert_eq!(record.status(), UrlStatus::Crawled);
    }

    #[test]
    fn test_word_layout() {
        let record = UrlRecord::new(UrlStatus::Error, 404, true);
        assert_eq!(record.word(), (4 << 11) | (1 << 10) | 404);
        assert_eq!(UrlRecord::from_word(record.word()), record);
        assert_eq!(UrlRecord::default().status(), UrlStatus::ToCrawl);
    }

    #[test]
    fn test_every_stored_status_survives_packing() {
        for status in UrlStatus::stored_statuses() {
            let record = UrlRecord::new(status, 809, false);
            assert_eq!(record.status(), status, "status {}", status);
            assert_eq!(record.http_status(), 809);
        }
    }

    #[test]
    fn test_http_status_is_clamped() {
        let record = UrlRecord::new(UrlStatus::Crawled, 5000, false);
        assert_eq!(record.http_status(), 1023);
        assert_eq!(record.status(), UrlStatus::Crawled);
        assert!(!record.is_prerequisite());
    }

    #[test]
    fn test_scraped_statuses() {
        assert!(UrlStatus::Crawled.is_scraped(true));
        assert!(UrlStatus::DomEmulated.is_scraped(true));
        assert!(UrlStatus::Downloaded.is_scraped(false));
        assert!(!UrlStatus::Downloaded.is_scraped(true));
        assert!(!UrlStatus::Error.is_scraped(false));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", UrlStatus::ToCrawl), "to_crawl");
        assert_eq!(format!("{}", UrlStatus::DomEmulated), "dom_emulated");
    }
}
