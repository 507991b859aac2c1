//! Types for the enforcement journal.
//!
//! Every lockdown transition, tamper block, PIN attempt and remote command
//! lands in the journal. `lockwarden log` reads it back.

use crate::policy::engine::Transition;
use crate::watcher::types::{Intervention, WatcherDecision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What produced a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// The lockdown engine changed state.
    Transition,
    /// The tamper watcher intervened.
    Tamper,
    /// A PIN-gated action was attempted.
    Pin,
    /// The remote command executor acted (uninstall / update).
    Command,
    /// A status sync ran.
    Sync,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Transition => write!(f, "transition"),
            EntryKind::Tamper => write!(f, "tamper"),
            EntryKind::Pin => write!(f, "pin"),
            EntryKind::Command => write!(f, "command"),
            EntryKind::Sync => write!(f, "sync"),
        }
    }
}

impl EntryKind {
    pub fn from_str_loose(s: &str) -> Option<EntryKind> {
        match s.trim().to_lowercase().as_str() {
            "transition" | "transitions" | "state" => Some(EntryKind::Transition),
            "tamper" | "watcher" => Some(EntryKind::Tamper),
            "pin" => Some(EntryKind::Pin),
            "command" | "commands" | "cmd" => Some(EntryKind::Command),
            "sync" => Some(EntryKind::Sync),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ok,
    /// Refused by policy (wrong PIN, action not allowed in this state).
    Rejected,
    /// Attempted and failed (network, platform).
    Failed,
}

/// One line of `journal.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EntryKind,
    /// Process that wrote the entry: `agent`, `watcher` or `cli`.
    pub source: String,
    pub summary: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl JournalEntry {
    pub fn new(
        kind: EntryKind,
        source: impl Into<String>,
        summary: impl Into<String>,
        outcome: Outcome,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            source: source.into(),
            summary: summary.into(),
            outcome,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Serialize) -> Self {
        self.detail = serde_json::to_value(detail).ok();
        self
    }

    pub fn transition(source: impl Into<String>, transition: &Transition) -> Self {
        Self::new(
            EntryKind::Transition,
            source,
            transition.to_string(),
            Outcome::Ok,
        )
        .with_detail(transition)
    }

    pub fn tamper(source: impl Into<String>, decision: &WatcherDecision) -> Self {
        let summary = decision
            .interventions
            .iter()
            .map(|i| match i {
                Intervention::SelfDefense { package, matched } => {
                    format!("blocked '{}' in {}", matched, package)
                }
                Intervention::LockEnforcement { package } => {
                    format!("lock re-asserted over {}", package)
                }
                Intervention::NotificationShade { package } => {
                    format!("shade dismissed ({})", package)
                }
            })
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(EntryKind::Tamper, source, summary, Outcome::Ok).with_detail(decision)
    }

    pub fn pin(source: impl Into<String>, action: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::new(EntryKind::Pin, source, format!("{} accepted", action), Outcome::Ok),
            Err(reason) => Self::new(
                EntryKind::Pin,
                source,
                format!("{} rejected: {}", action, reason),
                Outcome::Rejected,
            ),
        }
    }
}

/// Counts over a set of journal entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalSummary {
    pub total: usize,
    pub transitions: usize,
    pub tamper_blocks: usize,
    pub pin_rejections: usize,
    pub failures: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl JournalSummary {
    pub fn one_line(&self) -> String {
        format!(
            "{} entries | {} transitions | {} tamper blocks | {} PIN rejections | {} failures",
            self.total, self.transitions, self.tamper_blocks, self.pin_rejections, self.failures
        )
    }
}

/// Filter criteria for `lockwarden log`.
#[derive(Debug, Clone, Default)]
pub struct JournalFilter {
    pub kind: Option<EntryKind>,
    pub outcome: Option<Outcome>,
    /// Keep only the most recent N matches.
    pub limit: Option<usize>,
}
