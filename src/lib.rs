//! Scrape-Pool: a concurrent, resumable web scraper
//!
//! This crate implements a thread-pool based crawler that walks outward from a seed URL,
//! extracts typed content from every page it visits, and persists what it finds
//! incrementally. The core is made of four cooperating pieces:
//!
//! - a shared link frontier (visited set + bounded unvisited queue)
//! - a fetcher with rate-limit back-off
//! - a bounded content cache that flushes to a persistence sink
//! - a resizable worker pool driving the crawl loop

pub mod config;
pub mod crawler;
pub mod options;
pub mod session;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("page has no identifiable links: {url}")]
    NoLinksFound { url: String },

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid content pattern: {0}")]
    Regex(#[from] regex::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid content pattern: {0}")]
    InvalidPattern(String),
}

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// The request timed out
    Timeout,
    /// The connection could not be established or was reset
    ConnectionFailed,
    /// The server answered HTTP 429
    RateLimited,
    /// Any other failure (non-2xx status, unreadable body, bad URL)
    Other,
}

/// A failed fetch of a single link
#[derive(Debug, Clone, Error)]
#[error("{kind:?} fetching {url}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns true if the server asked us to slow down
    pub fn is_rate_limited(&self) -> bool {
        self.kind == FetchErrorKind::RateLimited
    }
}

/// Result type alias for crawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, CrawlerFactory, CrawlSnapshot};
pub use options::{OptionFlag, Options};
