//! Page fetching
//!
//! This module handles every request the crawler makes:
//! - the [`Transport`] seam (blocking `get(url) -> body`)
//! - an HTTP transport built on a blocking reqwest client
//! - an in-memory transport for tests and offline runs
//! - the [`Fetcher`], which adds rate-limit back-off and the "try the next link" policy
//!
//! # Retry Policy
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 429 | Sleep the back-off interval, then move to the next queued link |
//! | Timeout | Move to the next queued link |
//! | Connection refused/reset | Move to the next queued link |
//! | Other non-2xx | Move to the next queued link |
//!
//! A failed link is never retried; it stays visited.

use crate::config::CrawlerConfig;
use crate::crawler::frontier::Frontier;
use crate::options::Options;
use crate::{FetchError, FetchErrorKind};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Blocking fetch primitive
pub trait Transport: Send + Sync {
    /// Fetches `url` and returns its body
    fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// Builds a blocking HTTP client with the crawler's identity and timeouts
///
/// # Example
///
/// ```no_run
/// use scrape_pool::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client("scrape-pool/0.1", Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Transport backed by a blocking reqwest client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the transport from the crawler configuration
    pub fn from_config(config: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::new(client))
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| classify_error(url, &e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::new(
                FetchErrorKind::RateLimited,
                url,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        if !status.is_success() {
            return Err(FetchError::new(
                FetchErrorKind::Other,
                url,
                format!("HTTP {}", status.as_u16()),
            ));
        }

        response.text().map_err(|e| classify_error(url, &e))
    }
}

/// Maps a reqwest error onto the fetch taxonomy
fn classify_error(url: &str, error: &reqwest::Error) -> FetchError {
    let kind = if error.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
        FetchErrorKind::RateLimited
    } else if error.is_timeout() {
        FetchErrorKind::Timeout
    } else if error.is_connect() {
        FetchErrorKind::ConnectionFailed
    } else {
        FetchErrorKind::Other
    };
    FetchError::new(kind, url, error.to_string())
}

/// Serves pages from memory
///
/// Unknown URLs fail with `FetchErrorKind::Other`. Every call is counted so tests can
/// assert how often a link was requested.
#[derive(Debug, Default)]
pub struct MapTransport {
    pages: HashMap<String, Result<String, FetchErrorKind>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MapTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `body` for `url`
    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), Ok(body.into()));
        self
    }

    /// Fails every request for `url` with `kind`
    pub fn with_error(mut self, url: impl Into<String>, kind: FetchErrorKind) -> Self {
        self.pages.insert(url.into(), Err(kind));
        self
    }

    /// Number of requests made for `url`
    pub fn hits(&self, url: &str) -> usize {
        let hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.get(url).copied().unwrap_or(0)
    }

    /// Total number of requests made
    pub fn total_hits(&self) -> usize {
        let hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
        hits.values().sum()
    }
}

impl Transport for MapTransport {
    fn get(&self, url: &str) -> Result<String, FetchError> {
        {
            let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
            *hits.entry(url.to_string()).or_insert(0) += 1;
        }

        match self.pages.get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(kind)) => Err(FetchError::new(*kind, url, "scripted failure")),
            None => Err(FetchError::new(FetchErrorKind::Other, url, "HTTP 404")),
        }
    }
}

/// A successfully fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// The link that was actually fetched, which may differ from the one first tried
    pub link: String,
    pub body: String,
}

/// Fetches pages through a transport, applying the back-off and fallback policy
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    backoff: Duration,
    options: Options,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, backoff: Duration, options: Options) -> Self {
        Self {
            transport,
            backoff,
            options,
        }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Fetches one link once
    ///
    /// A rate-limited response sleeps the back-off interval before the error is returned,
    /// so the caller's next request is already slowed down.
    pub fn fetch(&self, link: &str) -> Result<String, FetchError> {
        if self.options.debug() {
            tracing::debug!("visiting {}", link);
        }

        match self.transport.get(link) {
            Ok(body) => Ok(body),
            Err(error) => {
                if self.options.debug() {
                    tracing::warn!("couldn't visit page {}: {}", link, error);
                } else {
                    tracing::trace!("fetch failed for {}: {}", link, error);
                }

                if error.is_rate_limited() {
                    tracing::debug!(
                        "rate limited on {}, backing off for {:?}",
                        link,
                        self.backoff
                    );
                    std::thread::sleep(self.backoff);
                }
                Err(error)
            }
        }
    }

    /// Fetches `link`, falling back to the next queued link on every failure
    ///
    /// Each fallback candidate is taken with [`Frontier::next_unvisited`], so it is marked
    /// visited before it is tried. Returns None once the frontier runs dry.
    pub fn fetch_next(&self, link: String, frontier: &Frontier) -> Option<FetchedPage> {
        let mut link = link;
        loop {
            match self.fetch(&link) {
                Ok(body) => return Some(FetchedPage { link, body }),
                Err(_) => link = frontier.next_unvisited()?,
            }
        }
    }
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("backoff", &self.backoff)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
