//! Journal writer: append-only JSONL.
//!
//! The daemon, the watcher process and one-shot CLI commands all append to
//! the same file. Each entry is one `write` of one line and is flushed
//! immediately.

use crate::audit::types::JournalEntry;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct Journal {
    path: PathBuf,
    file: Mutex<File>,
    entry_count: AtomicUsize,
}

impl Journal {
    /// Open the journal at `path`, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open journal: {}", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
            entry_count: AtomicUsize::new(0),
        })
    }

    pub fn record(&self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("Failed to serialize journal entry")?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("journal lock poisoned"))?;
        file.write_all(line.as_bytes())
            .context("Failed to write journal entry")?;
        file.flush().context("Failed to flush journal")?;
        self.entry_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Record, logging instead of failing. Journaling never aborts
    /// enforcement.
    pub fn record_quietly(&self, entry: &JournalEntry) {
        if let Err(e) = self.record(entry) {
            tracing::warn!(error = %e, "failed to write journal entry");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries written through this handle.
    pub fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }
}
