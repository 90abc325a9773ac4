//! Storage module for persisting crawl output
//!
//! This module handles everything that leaves the process at flush or finalize time:
//! - the [`PersistenceSink`] trait the crawl core writes through
//! - plain text files (one item per line)
//! - a SQLite database
//! - an in-memory recorder

mod file;
mod memory;
mod sqlite;
mod traits;

pub use file::FileSink;
pub use memory::MemorySink;
pub use sqlite::{SqliteSink, SCHEMA_SQL};
pub use traits::{LinkSet, PersistenceSink, StorageError, StorageResult};

use crate::config::{OutputBackend, OutputConfig};
use crate::ConfigError;
use crate::CrawlError;
use std::path::Path;
use std::sync::Arc;

/// Opens the sink selected by the output configuration
///
/// # Returns
///
/// * `Ok(Arc<dyn PersistenceSink>)` - Ready to receive batches
/// * `Err(CrawlError)` - The backend is missing its path or could not be opened
pub fn open_sink(config: &OutputConfig) -> Result<Arc<dyn PersistenceSink>, CrawlError> {
    match config.backend {
        OutputBackend::File => {
            let directory = config.directory.as_deref().ok_or_else(|| {
                ConfigError::Validation("directory is required for the file backend".to_string())
            })?;
            let sink: Arc<dyn PersistenceSink> = Arc::new(FileSink::new(directory));
            Ok(sink)
        }
        OutputBackend::Sqlite => {
            let path = config.database_path.as_deref().ok_or_else(|| {
                ConfigError::Validation(
                    "database-path is required for the sqlite backend".to_string(),
                )
            })?;
            let sink: Arc<dyn PersistenceSink> = Arc::new(SqliteSink::new(Path::new(path))?);
            Ok(sink)
        }
    }
}
