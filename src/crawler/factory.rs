//! Crawler construction
//!
//! A [`CrawlerFactory`] owns everything crawlers share across sessions: the session
//! counter, the limits, the option flags and the three collaborators (transport,
//! extractor, sink). It builds fresh crawlers and rebuilds crawlers from snapshots.

use crate::config::{Config, CrawlerConfig};
use crate::crawler::cache::ContentCache;
use crate::crawler::controller::{CrawlState, Crawler};
use crate::crawler::extractor::{ContentExtractor, HtmlExtractor};
use crate::crawler::fetcher::{Fetcher, HttpTransport, Transport};
use crate::crawler::frontier::Frontier;
use crate::crawler::snapshot::CrawlSnapshot;
use crate::options::Options;
use crate::session::SessionRegistry;
use crate::storage::{open_sink, PersistenceSink};
use crate::CrawlError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Limits applied to every crawler a factory builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlSettings {
    /// Initial number of workers
    pub threads: usize,
    /// Per content type collection limit
    pub data_limit: usize,
    /// Maximum length of the unvisited queue
    pub link_cache_limit: usize,
    /// Buffer size at which a content type is flushed
    pub data_cache_limit: usize,
    /// Sleep after a rate-limited response
    pub backoff: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            threads: 4,
            data_limit: 1_000,
            link_cache_limit: 1_000_000,
            data_cache_limit: 500_000,
            backoff: Duration::from_secs(30),
        }
    }
}

impl From<&CrawlerConfig> for CrawlSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            threads: config.threads,
            data_limit: config.data_limit,
            link_cache_limit: config.link_cache_limit,
            data_cache_limit: config.data_cache_limit,
            backoff: Duration::from_secs(config.rate_limit_backoff_secs),
        }
    }
}

/// Builds crawlers that share one session counter and set of collaborators
pub struct CrawlerFactory {
    registry: SessionRegistry,
    settings: CrawlSettings,
    options: Options,
    transport: Arc<dyn Transport>,
    extractor: Arc<dyn ContentExtractor>,
    sink: Arc<dyn PersistenceSink>,
    config_hash: Option<String>,
}

impl CrawlerFactory {
    pub fn new(
        settings: CrawlSettings,
        options: Options,
        transport: Arc<dyn Transport>,
        extractor: Arc<dyn ContentExtractor>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            settings,
            options,
            transport,
            extractor,
            sink,
            config_hash: None,
        }
    }

    /// Builds a factory with the HTTP transport, the HTML extractor and the configured sink
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlerFactory)` - Ready to create crawlers
    /// * `Err(CrawlError)` - The HTTP client, a content rule or the sink could not be set up
    pub fn from_config(config: &Config) -> Result<Self, CrawlError> {
        let transport = HttpTransport::from_config(&config.crawler)?;
        let extractor = HtmlExtractor::from_config(&config.content, &config.options)?;
        let sink = open_sink(&config.output)?;

        Ok(Self::new(
            CrawlSettings::from(&config.crawler),
            Options::from(&config.options),
            Arc::new(transport),
            Arc::new(extractor),
            sink,
        ))
    }

    /// Records the configuration hash in snapshots taken from this factory's crawlers
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn options(&self) -> Options {
        self.options
    }

    /// Number of crawlers built so far
    pub fn sessions_issued(&self) -> u64 {
        self.registry.issued()
    }

    fn fetcher(&self) -> Fetcher {
        Fetcher::new(
            Arc::clone(&self.transport),
            self.settings.backoff,
            self.options,
        )
    }

    /// Builds an unstarted crawler for `start_url`
    pub fn create(&self, start_url: &str) -> Crawler {
        let content_types = self.extractor.content_types();
        let state = CrawlState {
            session: self.registry.next_session(),
            start_url: start_url.to_string(),
            config_hash: self.config_hash.clone(),
            frontier: Frontier::new(self.settings.link_cache_limit),
            cache: ContentCache::new(
                content_types.clone(),
                self.settings.data_limit,
                self.settings.data_cache_limit,
            ),
            content_types,
            fetcher: self.fetcher(),
            extractor: Arc::clone(&self.extractor),
            sink: Arc::clone(&self.sink),
            options: self.options,
            seeded: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
        };
        Crawler::new(state, self.settings.threads)
    }

    /// Rebuilds a crawler from a snapshot and starts a pool of the recorded size
    ///
    /// The crawler gets a new session id. Content buffers are matched by name; types
    /// that are no longer configured are dropped. The seed page is not fetched again.
    pub fn restore(&self, snapshot: CrawlSnapshot) -> Result<Crawler, CrawlError> {
        match (&self.config_hash, &snapshot.config_hash) {
            (Some(current), Some(recorded)) if current != recorded => {
                tracing::warn!(
                    "Configuration changed since the snapshot of {} was taken",
                    snapshot.start_url
                );
            }
            _ => {}
        }

        let content_types = self.extractor.content_types();
        let state = CrawlState {
            session: self.registry.next_session(),
            start_url: snapshot.start_url,
            config_hash: self.config_hash.clone().or(snapshot.config_hash),
            frontier: Frontier::from_snapshot(snapshot.frontier, self.settings.link_cache_limit),
            cache: ContentCache::from_snapshot(
                content_types.clone(),
                snapshot.cache,
                self.settings.data_limit,
                self.settings.data_cache_limit,
            ),
            content_types,
            fetcher: self.fetcher(),
            extractor: Arc::clone(&self.extractor),
            sink: Arc::clone(&self.sink),
            options: self.options,
            seeded: AtomicBool::new(true),
            finalized: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
        };

        let crawler = Crawler::new(state, snapshot.pool_size.max(1));
        tracing::info!(
            "Resuming {} from snapshot taken at {}",
            crawler,
            snapshot.taken_at.to_rfc3339()
        );
        crawler.launch()?;
        Ok(crawler)
    }
}

impl std::fmt::Debug for CrawlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlerFactory")
            .field("settings", &self.settings)
            .field("options", &self.options)
            .field("sessions_issued", &self.sessions_issued())
            .finish_non_exhaustive()
    }
}
