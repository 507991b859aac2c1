//! Pattern matching and state-directory helpers.
//!
//! Package identifiers are matched with compiled globs (`CompiledMatcher`),
//! compiled once when the watcher rules are built. Visible UI text is matched
//! with a simpler case-insensitive `*` wildcard matcher so that rule authors
//! can write patterns like `*uninstall*` without thinking about glob syntax.

use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use std::path::{Path, PathBuf};

/// Environment variable overriding the state directory.
pub const HOME_ENV: &str = "LOCKWARDEN_HOME";

/// A pre-compiled set of glob patterns for package identifiers.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    patterns: Vec<(String, GlobMatcher)>,
}

impl CompiledMatcher {
    /// Compile a list of glob pattern strings into matchers.
    /// Returns an error if any pattern is malformed.
    pub fn new(patterns: &[String]) -> Result<Self, globset::Error> {
        let compiled = patterns
            .iter()
            .map(|p| {
                let glob = Glob::new(p)?;
                Ok((p.clone(), glob.compile_matcher()))
            })
            .collect::<Result<Vec<_>, globset::Error>>()?;
        Ok(Self { patterns: compiled })
    }

    /// Returns true if the package identifier matches any compiled pattern.
    pub fn matches(&self, package: &str) -> bool {
        let candidate = Path::new(package);
        self.patterns
            .iter()
            .any(|(_, matcher)| matcher.is_match(candidate))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Get the raw pattern strings.
    pub fn pattern_strings(&self) -> Vec<&str> {
        self.patterns.iter().map(|(s, _)| s.as_str()).collect()
    }
}

/// Check if a piece of visible text matches any of the given text patterns.
/// Matching is case-insensitive; `*` matches any run of characters.
pub fn text_matches(text: &str, patterns: &[String]) -> bool {
    let text = text.trim().to_lowercase();
    patterns
        .iter()
        .any(|pattern| wildcard_match(&text, &pattern.trim().to_lowercase()))
}

/// Simple wildcard matching where `*` matches any sequence of characters.
fn wildcard_match(text: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return text == pattern;
    }

    let mut pos = 0;

    // First part anchors at the start
    if !parts[0].is_empty() {
        if !text.starts_with(parts[0]) {
            return false;
        }
        pos = parts[0].len();
    }

    // Last part anchors at the end
    let last = parts[parts.len() - 1];
    if !last.is_empty() && (!text.ends_with(last) || text.len() < pos + last.len()) {
        return false;
    }

    // Middle parts must appear in order, before the anchored suffix
    let end = text.len() - last.len();
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match text[pos..end].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }

    true
}

/// Resolve the state directory: `$LOCKWARDEN_HOME`, else `~/.lockwarden`.
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".lockwarden"))
}

/// Path of the YAML configuration file inside a state directory.
pub fn config_path(state_dir: &Path) -> PathBuf {
    state_dir.join("config.yaml")
}

/// Path of the persisted key/value document inside a state directory.
pub fn store_path(state_dir: &Path) -> PathBuf {
    state_dir.join("state.json")
}

/// Path of the enforcement journal inside a state directory.
pub fn journal_path(state_dir: &Path) -> PathBuf {
    state_dir.join("journal.jsonl")
}

/// Directory that holds in-flight update artifacts.
pub fn downloads_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("downloads")
}
