//! SQLite persistence
//!
//! Links and content items are appended as rows stamped with the time they were flushed.

use crate::storage::traits::{LinkSet, PersistenceSink, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQL schema for the output database
pub const SCHEMA_SQL: &str = r#"
-- Links recorded at finalization
CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    link_set TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_links_set ON links(link_set);

-- Extracted content items, one row per item
CREATE TABLE IF NOT EXISTS content (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_type TEXT NOT NULL,
    item TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_content_type ON content(content_type);
"#;

/// SQLite output backend
pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Opens (or creates) the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of stored links in one set
    pub fn count_links(&self, set: LinkSet) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM links WHERE link_set = ?1",
            params![set.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Number of stored items for one content type
    pub fn count_content(&self, content_type: &str) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM content WHERE content_type = ?1",
            params![content_type],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// All stored items for one content type, in insertion order
    pub fn load_content(&self, content_type: &str) -> StorageResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT item FROM content WHERE content_type = ?1 ORDER BY id")?;
        let items = stmt
            .query_map(params![content_type], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(items)
    }
}

impl PersistenceSink for SqliteSink {
    fn persist_links(&self, set: LinkSet, links: &[String]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO links (url, link_set, recorded_at) VALUES (?1, ?2, ?3)",
            )?;
            for link in links {
                stmt.execute(params![link, set.as_str(), now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn persist_content(&self, content_type: &str, items: &[String]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO content (content_type, item, recorded_at) VALUES (?1, ?2, ?3)",
            )?;
            for item in items {
                stmt.execute(params![content_type, item, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
