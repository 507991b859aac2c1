//! Journal reader: filter, summarize and pretty-print for `lockwarden log`.

use crate::audit::types::*;
use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

pub struct JournalReader {
    path: PathBuf,
}

impl JournalReader {
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// All entries in file order. A missing journal reads as empty; a line
    /// that fails to parse is skipped with a warning rather than hiding the
    /// rest of the history.
    pub fn read_all(&self) -> Result<Vec<JournalEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read journal: {}", self.path.display()))?;

        Ok(content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(i, line)| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(line = i + 1, error = %e, "skipping unreadable journal line");
                    None
                }
            })
            .collect())
    }

    /// Apply `filter`; `limit` keeps the most recent matches, still in
    /// chronological order.
    pub fn filter_entries(entries: &[JournalEntry], filter: &JournalFilter) -> Vec<JournalEntry> {
        let matching: Vec<&JournalEntry> = entries
            .iter()
            .filter(|e| filter.kind.map_or(true, |k| e.kind == k))
            .filter(|e| filter.outcome.map_or(true, |o| e.outcome == o))
            .collect();
        let skip = filter
            .limit
            .map_or(0, |limit| matching.len().saturating_sub(limit));
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn summarize(entries: &[JournalEntry]) -> JournalSummary {
        let mut summary = JournalSummary {
            total: entries.len(),
            start_time: entries.first().map(|e| e.timestamp),
            end_time: entries.last().map(|e| e.timestamp),
            ..Default::default()
        };

        for entry in entries {
            match (entry.kind, entry.outcome) {
                (EntryKind::Transition, _) => summary.transitions += 1,
                (EntryKind::Tamper, _) => summary.tamper_blocks += 1,
                (EntryKind::Pin, Outcome::Rejected) => summary.pin_rejections += 1,
                _ => {}
            }
            if entry.outcome == Outcome::Failed {
                summary.failures += 1;
            }
        }

        summary
    }

    pub fn format_entry(entry: &JournalEntry) -> String {
        let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let outcome = match entry.outcome {
            Outcome::Ok => "OK".green().to_string(),
            Outcome::Rejected => "REJECTED".yellow().to_string(),
            Outcome::Failed => "FAILED".red().to_string(),
        };
        format!(
            "[{}] {:<8} {} {} ({})",
            timestamp.dimmed(),
            outcome,
            entry.kind.to_string().bold(),
            entry.summary,
            entry.source.dimmed()
        )
    }
}
