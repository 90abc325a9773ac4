//! Persistence traits and error types
//!
//! The crawl core never decides how links or content are laid out on disk. It hands
//! finished batches to a [`PersistenceSink`] and keeps going.

use thiserror::Error;

/// Errors that can occur while persisting crawl output
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid content type name: {0}")]
    InvalidName(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Which half of the frontier a batch of links came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkSet {
    Visited,
    Unvisited,
}

impl LinkSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visited => "visited",
            Self::Unvisited => "unvisited",
        }
    }
}

/// Destination for flushed links and content buffers
///
/// Implementations are shared by every worker and must serialize their own writes.
/// A failed call must leave the sink usable for later calls.
pub trait PersistenceSink: Send + Sync {
    /// Appends a batch of links
    fn persist_links(&self, set: LinkSet, links: &[String]) -> StorageResult<()>;

    /// Appends the buffered items of one content type
    fn persist_content(&self, content_type: &str, items: &[String]) -> StorageResult<()>;
}
