//! Crawl snapshots
//!
//! A snapshot holds everything needed to warm-restart a crawl: the frontier, the
//! content buffers with their counts, and the pool size. Worker threads and the stop
//! flag are never part of it.

use crate::crawler::cache::CacheSnapshot;
use crate::crawler::frontier::FrontierSnapshot;
use crate::CrawlError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serializable state of a stopped crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlSnapshot {
    pub start_url: String,
    /// Hash of the configuration file the crawl was started with, if known
    pub config_hash: Option<String>,
    pub taken_at: DateTime<Utc>,
    pub pool_size: usize,
    pub frontier: FrontierSnapshot,
    pub cache: CacheSnapshot,
}

/// Writes a snapshot as JSON
///
/// The data goes to a temporary file next to `path` first and is renamed into place,
/// so an interrupted save never leaves a truncated snapshot behind.
pub fn save_snapshot(snapshot: &CrawlSnapshot, path: &Path) -> Result<(), CrawlError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let encoded = serde_json::to_vec_pretty(snapshot)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, encoded)?;
    fs::rename(&tmp_path, path)?;

    tracing::info!(
        "Saved snapshot of {} to {} ({} visited, {} queued)",
        snapshot.start_url,
        path.display(),
        snapshot.frontier.visited.len(),
        snapshot.frontier.unvisited.len()
    );
    Ok(())
}

/// Reads a snapshot written by [`save_snapshot`]
pub fn load_snapshot(path: &Path) -> Result<CrawlSnapshot, CrawlError> {
    let data = fs::read(path)?;
    let snapshot: CrawlSnapshot = serde_json::from_slice(&data)?;
    Ok(snapshot)
}
