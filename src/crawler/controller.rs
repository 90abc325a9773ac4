//! Crawl controller
//!
//! A [`Crawler`] ties the frontier, fetcher, content cache and worker pool together.
//! Every worker runs the same loop:
//!
//! 1. Continue while `UNLIMITED` is set or some content type is below its limit
//! 2. Take the next unvisited link; an empty frontier ends this worker
//! 3. Fetch it, falling back to other queued links on failure
//! 4. Offer the page's links to the frontier while the queue has room
//! 5. Extract, buffer and possibly flush each unsaturated content type
//! 6. Leave when the pool asks this worker to stop
//!
//! The last worker to leave finalizes the crawl: completion banner, link sets and
//! remaining content buffers, each behind its option flag.

use crate::crawler::cache::ContentCache;
use crate::crawler::extractor::ContentExtractor;
use crate::crawler::fetcher::{FetchedPage, Fetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::pool::{WorkerHandle, WorkerPool};
use crate::crawler::snapshot::CrawlSnapshot;
use crate::options::{OptionFlag, Options};
use crate::session::SessionId;
use crate::storage::{LinkSet, PersistenceSink};
use crate::CrawlError;
use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State shared by the controller and all of its workers
pub(crate) struct CrawlState {
    pub(crate) session: SessionId,
    pub(crate) start_url: String,
    pub(crate) config_hash: Option<String>,
    pub(crate) frontier: Frontier,
    pub(crate) cache: ContentCache,
    pub(crate) content_types: Vec<String>,
    pub(crate) fetcher: Fetcher,
    pub(crate) extractor: Arc<dyn ContentExtractor>,
    pub(crate) sink: Arc<dyn PersistenceSink>,
    pub(crate) options: Options,
    pub(crate) seeded: AtomicBool,
    pub(crate) finalized: AtomicBool,
    // set while snapshotting so the exiting workers leave the buffers alone
    pub(crate) suspended: AtomicBool,
}

impl CrawlState {
    fn seed(&self) -> Result<usize, CrawlError> {
        let body = self.fetcher.fetch(&self.start_url)?;
        let links = self.extractor.extract_links(&self.start_url, &body)?;
        let added = self.frontier.seed(&self.start_url, links)?;
        self.collect_content(&self.start_url, &body);
        self.seeded.store(true, Ordering::SeqCst);
        tracing::info!("{} seeded with {} links", self, added);
        Ok(added)
    }

    fn should_continue(&self) -> bool {
        self.options.is_set(OptionFlag::Unlimited) || self.cache.not_all_collected()
    }

    fn run(&self, handle: &WorkerHandle) {
        let debug = self.options.debug();
        if debug {
            tracing::debug!("{}: worker {} started", self, handle.id());
        }

        while self.should_continue() && !handle.should_stop() {
            let Some(link) = self.frontier.next_unvisited() else {
                if debug {
                    tracing::debug!("{}: worker {} found no unvisited links", self, handle.id());
                }
                break;
            };
            if debug {
                tracing::debug!(
                    "{}: {} visited, {} unvisited",
                    self,
                    self.frontier.visited_len(),
                    self.frontier.unvisited_len()
                );
            }

            let Some(page) = self.fetcher.fetch_next(link, &self.frontier) else {
                break;
            };
            self.process_page(&page);
        }

        handle.retire_with(|| self.finalize());
    }

    fn process_page(&self, page: &FetchedPage) {
        if self.frontier.has_capacity() {
            match self.extractor.extract_links(&page.link, &page.body) {
                Ok(links) => {
                    self.frontier.offer_discovered(links);
                }
                Err(e) => {
                    if self.options.debug() {
                        tracing::debug!("{}", e);
                    }
                }
            }
        }

        self.collect_content(&page.link, &page.body);
    }

    fn collect_content(&self, page_url: &str, body: &str) {
        for content_type in &self.content_types {
            if self.cache.reached_limit(content_type) {
                continue;
            }
            let items = self.extractor.extract_content(page_url, body, content_type);
            self.cache.add_data(content_type, items);
        }
        self.cache.flush_if_over_threshold(self.sink.as_ref());

        if self.options.debug() {
            tracing::debug!("{}: collected {}", self, self.cache.summary());
        }
    }

    fn finalize(&self) {
        if self.suspended.load(Ordering::SeqCst) {
            tracing::debug!("{} suspended, skipping finalization", self);
            return;
        }
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.options.debug() {
            tracing::info!("==== {} finished ====", self);
            tracing::info!("{}", self.cache.summary());
        }

        if self.options.is_set(OptionFlag::SaveLinks) {
            self.save_links();
        }

        if self.options.is_set(OptionFlag::SaveContent) {
            let persisted = self.cache.flush_all(self.sink.as_ref());
            tracing::debug!("{}: saved {} remaining content items", self, persisted);
        }
    }

    fn save_links(&self) {
        let snapshot = self.frontier.snapshot();
        for (set, links) in [
            (LinkSet::Visited, &snapshot.visited),
            (LinkSet::Unvisited, &snapshot.unvisited),
        ] {
            if links.is_empty() {
                continue;
            }
            if let Err(e) = self.sink.persist_links(set, links) {
                tracing::error!("{}: failed to save {} links: {}", self, set.as_str(), e);
            }
        }
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Crawler::{} (started from {})", self.session, self.start_url)
    }
}

/// A crawl rooted at one start URL
///
/// Built by [`crate::CrawlerFactory`]. Dropping a crawler stops it and waits for its
/// workers.
pub struct Crawler {
    state: Arc<CrawlState>,
    pool: WorkerPool,
}

impl Crawler {
    pub(crate) fn new(state: CrawlState, pool_size: usize) -> Self {
        Self {
            state: Arc::new(state),
            pool: WorkerPool::new(pool_size),
        }
    }

    /// Seeds the frontier and starts the workers, logging any failure
    ///
    /// A crawler that failed to start is inert: [`Crawler::is_running`] stays false and
    /// no worker is ever spawned.
    pub fn start(self) -> Self {
        if let Err(e) = self.try_start() {
            tracing::error!("unable to start {}: {}", self, e);
        }
        self
    }

    /// Seeds the frontier (unless it already is) and starts the workers
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Workers are running
    /// * `Err(CrawlError::NoLinksFound)` - The start page has no followable links
    /// * `Err(CrawlError::Fetch)` - The start page could not be fetched
    /// * `Err(CrawlError::InvalidState)` - The crawler is already running or has finished
    pub fn try_start(&self) -> Result<(), CrawlError> {
        if self.is_running() {
            return Err(CrawlError::InvalidState(format!("{} is already running", self)));
        }
        if self.state.finalized.load(Ordering::SeqCst) {
            return Err(CrawlError::InvalidState(format!("{} has already finished", self)));
        }
        if !self.state.seeded.load(Ordering::SeqCst) {
            self.state.seed()?;
        }
        self.launch()
    }

    pub(crate) fn launch(&self) -> Result<(), CrawlError> {
        self.state.suspended.store(false, Ordering::SeqCst);
        let state = Arc::clone(&self.state);
        self.pool
            .set_task(move |handle: &WorkerHandle| state.run(handle));
        self.pool.start()?;
        tracing::info!("{} running with {} workers", self, self.pool.size());
        Ok(())
    }

    /// Asks the workers to stop after their current page
    pub fn stop(&self) {
        self.pool.stop();
    }

    /// Stops the workers, waits for them and finalizes the crawl
    ///
    /// Safe to call any number of times; finalization happens at most once. A crawler
    /// that was snapshotted is not finalized.
    pub fn close(&self) {
        self.pool.stop();
        self.pool.join();
        self.state.finalize();
    }

    /// Waits until every worker has exited
    pub fn join(&self) {
        self.pool.join();
    }

    /// Returns true while at least one worker is alive
    ///
    /// The last worker counts as alive until it has finalized the crawl.
    pub fn is_running(&self) -> bool {
        !self.pool.all_terminated()
    }

    /// One line progress summary
    pub fn get_collected_info(&self) -> String {
        format!(
            "{}: {} visited, {} queued, {} workers; {}",
            self,
            self.state.frontier.visited_len(),
            self.state.frontier.unvisited_len(),
            self.pool.live_count(),
            self.state.cache.summary()
        )
    }

    /// Stops the crawl and captures its state
    ///
    /// Waits for in-flight pages to finish. The exiting workers do not finalize, so
    /// unflushed buffers end up in the snapshot instead of the sink.
    pub fn snapshot(&self) -> CrawlSnapshot {
        self.state.suspended.store(true, Ordering::SeqCst);
        self.pool.stop();
        self.pool.join();

        CrawlSnapshot {
            start_url: self.state.start_url.clone(),
            config_hash: self.state.config_hash.clone(),
            taken_at: Utc::now(),
            pool_size: self.pool.size(),
            frontier: self.state.frontier.snapshot(),
            cache: self.state.cache.snapshot(),
        }
    }

    /// Grows the pool to `total` workers
    pub fn add_more_threads(&self, total: usize) -> Result<usize, CrawlError> {
        self.pool.add_more_threads(total)
    }

    /// Shrinks the pool to `target` workers, blocking until it has
    pub fn decrease_threads_to(&self, target: usize) {
        self.pool.decrease_threads_to(target);
    }

    /// Configured number of workers
    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    pub fn live_workers(&self) -> usize {
        self.pool.live_count()
    }

    pub fn session(&self) -> SessionId {
        self.state.session
    }

    pub fn start_url(&self) -> &str {
        &self.state.start_url
    }

    pub fn visited_count(&self) -> usize {
        self.state.frontier.visited_len()
    }

    pub fn queued_count(&self) -> usize {
        self.state.frontier.unvisited_len()
    }

    /// Items accepted so far for a content type
    pub fn collected(&self, content_type: &str) -> Option<usize> {
        self.state.cache.collected(content_type)
    }

    /// Items of a content type not yet handed to the sink
    pub fn buffered(&self, content_type: &str) -> Option<usize> {
        self.state.cache.buffered(content_type)
    }
}

impl fmt::Display for Crawler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.state.as_ref(), f)
    }
}

impl fmt::Debug for Crawler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crawler")
            .field("session", &self.state.session)
            .field("start_url", &self.state.start_url)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Drop for Crawler {
    fn drop(&mut self) {
        self.pool.stop();
        self.pool.join();
    }
}
