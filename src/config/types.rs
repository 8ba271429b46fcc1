use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for the crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub archive: ArchiveConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub scope: ScopeConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of fetches in flight
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Pause before each request (milliseconds)
    #[serde(rename = "inter-request-delay-ms", default)]
    pub inter_request_delay_ms: u64,

    /// Pause after a failed request (milliseconds)
    #[serde(rename = "error-delay-ms", default = "default_error_delay_ms")]
    pub error_delay_ms: u64,

    /// Responses larger than this are abandoned (bytes)
    #[serde(rename = "max-response-size", default)]
    pub max_response_size: Option<u64>,

    /// Timeout for a whole request (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for establishing a connection (seconds)
    #[serde(rename = "connect-timeout-secs", default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Save the frontier at least this often (seconds)
    #[serde(rename = "save-interval-secs", default = "default_save_interval_secs")]
    pub save_interval_secs: u64,

    /// Save the frontier once this many changes are pending
    #[serde(rename = "save-threshold", default = "default_save_threshold")]
    pub save_threshold: usize,

    /// Serve URLs already present in the archive from the archive
    #[serde(rename = "reuse-archived", default = "default_true")]
    pub reuse_archived: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            inter_request_delay_ms: 0,
            error_delay_ms: default_error_delay_ms(),
            max_response_size: None,
            request_timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_timeout_secs(),
            save_interval_secs: default_save_interval_secs(),
            save_threshold: default_save_threshold(),
            reuse_archived: true,
        }
    }
}

/// Where and how archives are written
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Destination directory for archives, index, progress and lock
    pub destination: PathBuf,

    /// Rotate an archive file once it grows past this size (bytes)
    #[serde(rename = "max-archive-length", default = "default_max_archive_length")]
    pub max_archive_length: u64,

    /// Responses larger than this go to the `large` archives (bytes)
    #[serde(rename = "large-file-threshold", default = "default_large_file_threshold")]
    pub large_file_threshold: u64,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    ///
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// What gets crawled
#[derive(Debug, Clone, Deserialize)]
pub struct ScopeConfig {
    /// Starting URLs
    pub seeds: Vec<String>,

    /// Domain patterns (e.g., "example.com" or "*.example.com").
    /// Empty means the hosts of the seeds.
    #[serde(default)]
    pub domains: Vec<String>,

    /// URL models a page must match, when given
    #[serde(default)]
    pub rules: Vec<String>,

    /// Fetch prerequisites (images, scripts, stylesheets) on any domain
    #[serde(rename = "prerequisites-anywhere", default = "default_true")]
    pub prerequisites_anywhere: bool,
}

fn default_parallelism() -> u32 {
    5
}

fn default_error_delay_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_save_interval_secs() -> u64 {
    600
}

fn default_save_threshold() -> usize {
    1000
}

fn default_max_archive_length() -> u64 {
    512 * 1024 * 1024
}

fn default_large_file_threshold() -> u64 {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}
