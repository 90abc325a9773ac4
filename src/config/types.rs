use serde::Deserialize;

/// Main configuration structure for a crawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
}

/// Crawl engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// URL the crawl starts from
    pub seed: String,

    /// Number of workers started with the pool
    pub threads: usize,

    /// Per content type collection limit
    #[serde(rename = "data-limit")]
    pub data_limit: usize,

    /// Maximum length of the unvisited queue
    #[serde(rename = "link-cache-limit", default = "default_link_cache_limit")]
    pub link_cache_limit: usize,

    /// Buffer size at which a content type is flushed to the sink
    #[serde(rename = "data-cache-limit", default = "default_data_cache_limit")]
    pub data_cache_limit: usize,

    /// Sleep after an HTTP 429 before moving on (seconds)
    #[serde(
        rename = "rate-limit-backoff-secs",
        default = "default_rate_limit_backoff_secs"
    )]
    pub rate_limit_backoff_secs: u64,

    /// Per request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Boolean switches, see [`crate::options::OptionFlag`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    #[serde(rename = "debug-mode")]
    pub debug_mode: bool,

    #[serde(rename = "save-links")]
    pub save_links: bool,

    #[serde(rename = "save-content")]
    pub save_content: bool,

    pub unlimited: bool,

    #[serde(rename = "restrict-language")]
    pub restrict_language: bool,

    /// Primary language subtag accepted when `restrict-language` is set (e.g. "en")
    pub language: Option<String>,
}

/// Where flushed links and content end up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    /// One text file per content type plus `links.txt`
    #[default]
    File,
    /// A SQLite database
    Sqlite,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub backend: OutputBackend,

    /// Directory for the file backend
    pub directory: Option<String>,

    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: Option<String>,
}

/// A content type to collect
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    /// Name of the content type, also used for output file names
    pub name: String,

    /// Regex matched against the page text
    pub pattern: Option<String>,

    /// CSS selector whose matches contribute an attribute value or their text
    pub selector: Option<String>,

    /// Attribute read from `selector` matches; text content when absent
    pub attribute: Option<String>,
}

fn default_link_cache_limit() -> usize {
    1_000_000
}

fn default_data_cache_limit() -> usize {
    500_000
}

fn default_rate_limit_backoff_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("scrape-pool/{}", env!("CARGO_PKG_VERSION"))
}
