//! Bounded content cache
//!
//! Each content type accumulates extracted items in an in-memory buffer. A buffer that
//! reaches the flush threshold is handed to the persistence sink and cleared; the
//! running `collected` count survives the flush and drives the crawl's stop condition.
//!
//! Every content type sits behind its own mutex, so appends and flushes of one type
//! never race and never block other types.

use crate::storage::PersistenceSink;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// One named category of extracted content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentType {
    name: String,
    buffer: HashSet<String>,
    collected: usize,
}

impl ContentType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: HashSet::new(),
            collected: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Items accepted since the crawl started, flushed or not
    pub fn collected(&self) -> usize {
        self.collected
    }

    /// Items currently held in memory
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true once `limit` items have been accepted
    pub fn reached_limit(&self, limit: usize) -> bool {
        self.collected >= limit
    }

    /// Appends new items until `limit` is reached
    ///
    /// Items already in the buffer are not counted twice. Items past the limit are
    /// dropped, even when the limit is hit in the middle of a batch.
    ///
    /// # Returns
    ///
    /// The number of items accepted
    pub fn add_data<I>(&mut self, items: I, limit: usize) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut accepted = 0;
        for item in items {
            if self.reached_limit(limit) {
                break;
            }
            if self.buffer.insert(item) {
                self.collected += 1;
                accepted += 1;
            }
        }
        accepted
    }

    /// Sorted copy of the buffer
    pub fn items(&self) -> Vec<String> {
        let mut items: Vec<String> = self.buffer.iter().cloned().collect();
        items.sort();
        items
    }

    /// Persists the buffer and clears it, keeping the collected count
    ///
    /// The buffer is kept when the sink fails so nothing is lost. An empty buffer is
    /// not persisted at all.
    pub fn flush(&mut self, sink: &dyn PersistenceSink) -> crate::storage::StorageResult<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let items = self.items();
        sink.persist_content(&self.name, &items)?;
        self.buffer.clear();
        Ok(items.len())
    }
}

/// Serializable form of one content type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeSnapshot {
    pub name: String,
    pub buffer: Vec<String>,
    pub collected: usize,
}

/// Serializable form of the whole cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub types: Vec<ContentTypeSnapshot>,
}

// the name is immutable, so lookups never wait on a type's lock
#[derive(Debug)]
struct Slot {
    name: String,
    content: Mutex<ContentType>,
}

/// All content types of a crawl plus their shared limits
#[derive(Debug)]
pub struct ContentCache {
    types: Vec<Slot>,
    data_limit: usize,
    flush_threshold: usize,
}

impl ContentCache {
    /// Creates empty buffers for `names`
    ///
    /// * `data_limit` - per type collection limit
    /// * `flush_threshold` - buffer size at which a type is flushed
    pub fn new<I, S>(names: I, data_limit: usize, flush_threshold: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: names
                .into_iter()
                .map(|name| {
                    let name = name.into();
                    Slot {
                        content: Mutex::new(ContentType::new(name.clone())),
                        name,
                    }
                })
                .collect(),
            data_limit,
            flush_threshold,
        }
    }

    /// Creates the cache for `names` and restores matching entries from a snapshot
    ///
    /// Snapshot entries for types that are no longer configured are dropped with a warning.
    pub fn from_snapshot<I, S>(
        names: I,
        snapshot: CacheSnapshot,
        data_limit: usize,
        flush_threshold: usize,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cache = Self::new(names, data_limit, flush_threshold);
        for saved in snapshot.types {
            match cache.find(&saved.name) {
                Some(slot) => {
                    let mut content_type = lock(slot);
                    content_type.buffer = saved.buffer.into_iter().collect();
                    content_type.collected = saved.collected.max(content_type.buffer.len());
                }
                None => tracing::warn!(
                    "Dropping snapshot data for unconfigured content type '{}'",
                    saved.name
                ),
            }
        }
        cache
    }

    fn find(&self, name: &str) -> Option<&Mutex<ContentType>> {
        self.types
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| &slot.content)
    }

    pub fn data_limit(&self) -> usize {
        self.data_limit
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// Content type names in configuration order
    pub fn names(&self) -> Vec<String> {
        self.types.iter().map(|slot| slot.name.clone()).collect()
    }

    /// Returns true if `name` has reached the data limit (unknown types count as saturated)
    pub fn reached_limit(&self, name: &str) -> bool {
        self.find(name)
            .map_or(true, |slot| lock(slot).reached_limit(self.data_limit))
    }

    /// Appends items to `name`, respecting the data limit
    pub fn add_data<I>(&self, name: &str, items: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        match self.find(name) {
            Some(slot) => lock(slot).add_data(items, self.data_limit),
            None => 0,
        }
    }

    /// Flushes every type whose buffer has reached the flush threshold
    ///
    /// Sink failures are logged and leave that type's buffer in place.
    ///
    /// # Returns
    ///
    /// The number of content types flushed
    pub fn flush_if_over_threshold(&self, sink: &dyn PersistenceSink) -> usize {
        let mut flushed = 0;
        for slot in &self.types {
            let mut content_type = lock(&slot.content);
            if content_type.buffered() < self.flush_threshold {
                continue;
            }
            match content_type.flush(sink) {
                Ok(_) => flushed += 1,
                Err(e) => tracing::error!(
                    "Failed to flush content type '{}': {}",
                    content_type.name,
                    e
                ),
            }
        }
        flushed
    }

    /// Flushes every non-empty buffer regardless of size
    ///
    /// Each type is attempted even if an earlier one fails.
    ///
    /// # Returns
    ///
    /// The number of items persisted
    pub fn flush_all(&self, sink: &dyn PersistenceSink) -> usize {
        let mut persisted = 0;
        for slot in &self.types {
            let mut content_type = lock(&slot.content);
            match content_type.flush(sink) {
                Ok(count) => persisted += count,
                Err(e) => tracing::error!(
                    "Failed to save content type '{}': {}",
                    content_type.name,
                    e
                ),
            }
        }
        persisted
    }

    /// Returns true while at least one type is below the data limit
    pub fn not_all_collected(&self) -> bool {
        self.types
            .iter()
            .any(|slot| !lock(&slot.content).reached_limit(self.data_limit))
    }

    /// Collected count of `name`
    pub fn collected(&self, name: &str) -> Option<usize> {
        self.find(name).map(|slot| lock(slot).collected)
    }

    /// Buffered item count of `name`
    pub fn buffered(&self, name: &str) -> Option<usize> {
        self.find(name).map(|slot| lock(slot).buffered())
    }

    /// Copy of every type's buffer and count
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            types: self
                .types
                .iter()
                .map(|slot| {
                    let content_type = lock(&slot.content);
                    ContentTypeSnapshot {
                        name: content_type.name.clone(),
                        buffer: content_type.items(),
                        collected: content_type.collected,
                    }
                })
                .collect(),
        }
    }

    /// One line summary such as `emails: 12/100, images: 100/100`
    pub fn summary(&self) -> String {
        self.types
            .iter()
            .map(|slot| {
                let content_type = lock(&slot.content);
                format!(
                    "{}: {}/{}",
                    content_type.name, content_type.collected, self.data_limit
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn lock(slot: &Mutex<ContentType>) -> MutexGuard<'_, ContentType> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LinkSet, MemorySink, StorageError, StorageResult};
    use std::sync::mpsc;
    use std::thread;

    fn items(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{}-{}", prefix, i)).collect()
    }

    struct FailingSink;

    impl PersistenceSink for FailingSink {
        fn persist_links(&self, _set: LinkSet, _links: &[String]) -> StorageResult<()> {
            Err(StorageError::InvalidName("links".to_string()))
        }

        fn persist_content(&self, content_type: &str, _items: &[String]) -> StorageResult<()> {
            Err(StorageError::InvalidName(content_type.to_string()))
        }
    }

    // blocks inside persist_content until released
    struct GateSink {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl PersistenceSink for GateSink {
        fn persist_links(&self, _set: LinkSet, _links: &[String]) -> StorageResult<()> {
            Ok(())
        }

        fn persist_content(&self, _content_type: &str, _items: &[String]) -> StorageResult<()> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            Ok(())
        }
    }

    /// Eight threads feed disjoint batches into one type while flushing
    fn fill_concurrently(limit: usize) -> (ContentCache, MemorySink) {
        let cache = ContentCache::new(["emails"], limit, 4);
        let sink = MemorySink::new();
        thread::scope(|scope| {
            for t in 0..8 {
                let cache = &cache;
                let sink = &sink;
                scope.spawn(move || {
                    for batch in items(&format!("t{}", t), 30).chunks(3) {
                        cache.add_data("emails", batch.to_vec());
                        cache.flush_if_over_threshold(sink);
                    }
                });
            }
        });
        (cache, sink)
    }

    #[test]
    fn test_concurrent_add_and_flush_keep_counts_consistent() {
        for (limit, expected) in [(150, 150), (1_000, 240)] {
            let (cache, sink) = fill_concurrently(limit);

            let persisted = sink.content("emails");
            let distinct: HashSet<&String> = persisted.iter().collect();
            assert_eq!(distinct.len(), persisted.len(), "item persisted twice");

            assert_eq!(cache.collected("emails"), Some(expected));
            assert_eq!(
                persisted.len() + cache.buffered("emails").unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_lookups_do_not_wait_on_a_flushing_type() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let sink = GateSink {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let cache = ContentCache::new(["emails", "images"], 100, 1);
        cache.add_data("emails", items("e", 1));

        thread::scope(|scope| {
            scope.spawn(|| cache.flush_if_over_threshold(&sink));
            entered_rx.recv().unwrap();

            // "emails" is locked inside the sink right now
            assert_eq!(cache.collected("images"), Some(0));
            assert_eq!(cache.add_data("images", items("i", 2)), 2);
            assert!(!cache.reached_limit("images"));
            assert_eq!(cache.names(), vec!["emails".to_string(), "images".to_string()]);

            release_tx.send(()).unwrap();
            drop(release_tx);
        });

        assert_eq!(cache.buffered("emails"), Some(0));
        assert_eq!(cache.collected("emails"), Some(1));
    }

    #[test]
    fn test_add_data_respects_limit_mid_batch() {
        let mut content_type = ContentType::new("emails");
        assert_eq!(content_type.add_data(items("a", 3), 5), 3);
        assert_eq!(content_type.add_data(items("b", 10), 5), 2);
        assert_eq!(content_type.collected(), 5);
        assert!(content_type.reached_limit(5));
    }

    #[test]
    fn test_add_data_after_limit_is_noop() {
        let mut content_type = ContentType::new("emails");
        content_type.add_data(items("a", 5), 5);
        let before = content_type.clone();

        assert_eq!(content_type.add_data(items("b", 3), 5), 0);
        assert_eq!(content_type, before);
    }

    #[test]
    fn test_duplicates_in_buffer_not_counted() {
        let mut content_type = ContentType::new("emails");
        content_type.add_data(vec!["x".to_string(), "x".to_string()], 10);
        content_type.add_data(vec!["x".to_string()], 10);
        assert_eq!(content_type.collected(), 1);
    }

    #[test]
    fn test_flush_keeps_count() {
        let sink = MemorySink::new();
        let mut content_type = ContentType::new("emails");
        content_type.add_data(items("a", 5), 5);

        assert_eq!(content_type.flush(&sink).unwrap(), 5);
        assert_eq!(content_type.buffered(), 0);
        assert_eq!(content_type.collected(), 5);
        assert!(content_type.reached_limit(5));
        assert_eq!(sink.content("emails").len(), 5);
    }

    #[test]
    fn test_flush_empty_buffer_is_noop() {
        let sink = MemorySink::new();
        let mut content_type = ContentType::new("emails");
        assert_eq!(content_type.flush(&sink).unwrap(), 0);
        assert_eq!(sink.content_batches(), 0);
    }

    #[test]
    fn test_failed_flush_keeps_buffer() {
        let mut content_type = ContentType::new("emails");
        content_type.add_data(items("a", 3), 10);
        assert!(content_type.flush(&FailingSink).is_err());
        assert_eq!(content_type.buffered(), 3);
    }

    #[test]
    fn test_flush_if_over_threshold() {
        let sink = MemorySink::new();
        let cache = ContentCache::new(["emails", "images"], 100, 3);

        cache.add_data("emails", items("e", 3));
        cache.add_data("images", items("i", 2));

        assert_eq!(cache.flush_if_over_threshold(&sink), 1);
        assert_eq!(cache.buffered("emails"), Some(0));
        assert_eq!(cache.collected("emails"), Some(3));
        assert_eq!(cache.buffered("images"), Some(2));
        assert_eq!(sink.content("emails").len(), 3);
        assert!(sink.content("images").is_empty());
    }

    #[test]
    fn test_flush_all_continues_past_failures() {
        let cache = ContentCache::new(["emails", "images"], 100, 50);
        cache.add_data("emails", items("e", 2));
        assert_eq!(cache.flush_all(&FailingSink), 0);
        assert_eq!(cache.buffered("emails"), Some(2));

        let sink = MemorySink::new();
        cache.add_data("images", items("i", 1));
        assert_eq!(cache.flush_all(&sink), 3);
        // the empty-after-flush pass does not produce empty batches
        assert_eq!(cache.flush_all(&sink), 0);
        assert_eq!(sink.content_batches(), 2);
    }

    #[test]
    fn test_not_all_collected() {
        let cache = ContentCache::new(["emails", "images"], 2, 10);
        assert!(cache.not_all_collected());

        cache.add_data("emails", items("e", 5));
        assert!(cache.reached_limit("emails"));
        assert!(cache.not_all_collected());

        cache.add_data("images", items("i", 2));
        assert!(!cache.not_all_collected());
    }

    #[test]
    fn test_unknown_type() {
        let cache = ContentCache::new(["emails"], 2, 10);
        assert!(cache.reached_limit("videos"));
        assert_eq!(cache.add_data("videos", items("v", 1)), 0);
        assert_eq!(cache.collected("videos"), None);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let cache = ContentCache::new(["emails", "images"], 10, 10);
        cache.add_data("emails", items("e", 3));
        let snapshot = cache.snapshot();

        let restored = ContentCache::from_snapshot(["emails", "images"], snapshot.clone(), 10, 10);
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.summary(), "emails: 3/10, images: 0/10");
    }

    #[test]
    fn test_from_snapshot_drops_unknown_types() {
        let snapshot = CacheSnapshot {
            types: vec![ContentTypeSnapshot {
                name: "videos".to_string(),
                buffer: vec!["v".to_string()],
                collected: 7,
            }],
        };
        let restored = ContentCache::from_snapshot(["emails"], snapshot, 10, 10);
        assert_eq!(restored.names(), vec!["emails".to_string()]);
        assert_eq!(restored.collected("emails"), Some(0));
    }
}
