//! Plain text persistence: one item per line, appended

use crate::storage::traits::{LinkSet, PersistenceSink, StorageError, StorageResult};
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Appends links to `<dir>/links-<set>.txt` and content to `<dir>/content/<name>.txt`
pub struct FileSink {
    directory: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSink {
    /// Creates a sink rooted at `directory`; the directory is created on first write
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding one link set
    pub fn links_path(&self, set: LinkSet) -> PathBuf {
        self.directory.join(format!("links-{}.txt", set.as_str()))
    }

    /// Path of the file holding one content type
    pub fn content_path(&self, content_type: &str) -> PathBuf {
        self.directory
            .join("content")
            .join(format!("{}.txt", content_type))
    }

    fn append_lines(&self, path: &Path, items: &[String]) -> StorageResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for item in items {
            // one record per line
            writeln!(writer, "{}", item.replace(['\r', '\n'], " "))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl PersistenceSink for FileSink {
    fn persist_links(&self, set: LinkSet, links: &[String]) -> StorageResult<()> {
        self.append_lines(&self.links_path(set), links)
    }

    fn persist_content(&self, content_type: &str, items: &[String]) -> StorageResult<()> {
        if content_type.is_empty() || content_type.contains(['/', '\\', '.']) {
            return Err(StorageError::InvalidName(content_type.to_string()));
        }
        self.append_lines(&self.content_path(content_type), items)
    }
}
