use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Catalog root URLs to start from
    pub seeds: Vec<String>,

    /// Maximum listing pages fetched per category
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Number of concurrent workers
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "politeness-delay", default = "default_politeness_delay")]
    pub politeness_delay: u64,

    /// Hard wall-clock timeout of a single fetch (seconds)
    #[serde(rename = "fetch-timeout", default = "default_fetch_timeout")]
    pub fetch_timeout: u64,

    /// Whether to follow each listed item to its detail page
    #[serde(rename = "follow-details", default)]
    pub follow_details: bool,
}

/// Retry and backoff configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries of one task
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "base-delay", default = "default_base_delay")]
    pub base_delay: u64,

    /// Upper bound of any retry delay (milliseconds)
    #[serde(rename = "max-delay", default = "default_max_delay")]
    pub max_delay: u64,
}

/// HTTP request configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Base URL of the category listing API
    #[serde(rename = "listing-api", default = "default_listing_api")]
    pub listing_api: String,

    /// Delivery area code passed to the listing API
    #[serde(rename = "user-area", default = "default_user_area")]
    pub user_area: String,
}

/// Session cookie configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// JSON cookie export written by an out-of-band login
    #[serde(rename = "cookies-file")]
    pub cookies_file: Option<String>,

    /// Inline cookies, used when no cookie file is configured
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

/// Dedup filter configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DedupConfig {
    /// Keep dedup keys in the database instead of memory
    #[serde(default)]
    pub persistent: bool,

    /// Name of the dedup key set; defaults to one set per run
    pub scope: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving CSV exports
    #[serde(rename = "export-dir", default = "default_export_dir")]
    pub export_dir: String,

    /// Sinks each record is routed to, in delivery order
    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkKind>,
}

/// Available record sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Dedup,
    Document,
    Export,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            listing_api: default_listing_api(),
            user_area: default_user_area(),
        }
    }
}

fn default_max_pages() -> u32 {
    10
}

fn default_concurrency() -> u32 {
    1
}

fn default_politeness_delay() -> u64 {
    2000
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    32_000
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/120.0.0.0 Safari/537.36"
        .to_string()
}

fn default_listing_api() -> String {
    "https://search.kongfz.com/pc-gw/search-web/client/pc/product/category/list".to_string()
}

fn default_user_area() -> String {
    "1006000000".to_string()
}

fn default_export_dir() -> String {
    "./data".to_string()
}

fn default_sinks() -> Vec<SinkKind> {
    vec![SinkKind::Dedup, SinkKind::Document, SinkKind::Export]
}
