//! Crawler module: the crawl engine
//!
//! This module contains the core crawling logic, including:
//! - the shared link frontier
//! - page fetching with rate-limit back-off
//! - HTML link and content extraction
//! - the bounded content cache
//! - the resizable worker pool
//! - crawl control, snapshots and crawler construction

mod cache;
mod controller;
mod extractor;
mod factory;
mod fetcher;
mod frontier;
mod pool;
mod snapshot;

pub use cache::{CacheSnapshot, ContentCache, ContentType, ContentTypeSnapshot};
pub use controller::Crawler;
pub use extractor::{ContentExtractor, ContentKind, ContentRule, HtmlExtractor};
pub use factory::{CrawlSettings, CrawlerFactory};
pub use fetcher::{build_http_client, FetchedPage, Fetcher, HttpTransport, MapTransport, Transport};
pub use frontier::{Frontier, FrontierSnapshot};
pub use pool::{Task, UnitState, WorkerHandle, WorkerPool};
pub use snapshot::{load_snapshot, save_snapshot, CrawlSnapshot};

use crate::config::Config;
use crate::CrawlError;

/// Runs a crawl from the configured seed to completion
///
/// Blocks until the crawl reaches its collection limit or runs out of links, then
/// finalizes it.
///
/// # Returns
///
/// * `Ok(Crawler)` - The finished crawler, for inspection
/// * `Err(CrawlError)` - The crawl could not be set up or seeded
pub fn crawl(config: &Config) -> Result<Crawler, CrawlError> {
    let factory = CrawlerFactory::from_config(config)?;
    let crawler = factory.create(&config.crawler.seed);
    crawler.try_start()?;
    crawler.join();
    crawler.close();
    Ok(crawler)
}
