//! In-memory persistence, for tests and embedders that want the results in-process

use crate::storage::traits::{LinkSet, PersistenceSink, StorageResult};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Recorded {
    links: HashMap<LinkSet, Vec<String>>,
    content: HashMap<String, Vec<String>>,
    content_batches: usize,
}

/// Records every persisted batch
#[derive(Debug, Default)]
pub struct MemorySink {
    recorded: Mutex<Recorded>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Links persisted for one set
    pub fn links(&self, set: LinkSet) -> Vec<String> {
        self.recorded().links.get(&set).cloned().unwrap_or_default()
    }

    /// Items persisted for one content type
    pub fn content(&self, content_type: &str) -> Vec<String> {
        self.recorded()
            .content
            .get(content_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `persist_content` calls that carried at least one item
    pub fn content_batches(&self) -> usize {
        self.recorded().content_batches
    }
}

impl PersistenceSink for MemorySink {
    fn persist_links(&self, set: LinkSet, links: &[String]) -> StorageResult<()> {
        self.recorded()
            .links
            .entry(set)
            .or_default()
            .extend_from_slice(links);
        Ok(())
    }

    fn persist_content(&self, content_type: &str, items: &[String]) -> StorageResult<()> {
        let mut recorded = self.recorded();
        if !items.is_empty() {
            recorded.content_batches += 1;
        }
        recorded
            .content
            .entry(content_type.to_string())
            .or_default()
            .extend_from_slice(items);
        Ok(())
    }
}
