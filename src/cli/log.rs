//! `lockwarden log`: browse the enforcement journal.
//!
//! Shows every transition, tamper block, PIN attempt and remote command,
//! newest last. This is the "what happened to this device?" command.

use crate::audit::{EntryKind, JournalFilter, JournalReader, Outcome};
use crate::cli::status::format_duration;
use crate::cli::Workspace;
use anyhow::{bail, Context, Result};
use colored::Colorize;

/// Run the `lockwarden log` command.
pub fn run_log(
    kind: Option<&str>,
    outcome: Option<&str>,
    limit: Option<usize>,
    summary_only: bool,
) -> Result<()> {
    let ws = Workspace::load()?;
    let reader = JournalReader::with_path(ws.journal_path());
    let entries = reader.read_all().context("Failed to read the journal")?;

    if entries.is_empty() {
        println!();
        println!("  {} The journal is empty.", "ℹ".blue());
        println!("  Entries appear once the agent acts:");
        println!("    {}", "lockwarden run".dimmed());
        println!();
        return Ok(());
    }

    let filter = JournalFilter {
        kind: match kind {
            Some(k) => match EntryKind::from_str_loose(k) {
                Some(kind) => Some(kind),
                None => bail!(
                    "Unknown entry kind '{}'. Use: transition, tamper, pin, command, sync",
                    k
                ),
            },
            None => None,
        },
        outcome: match outcome.map(|o| o.trim().to_lowercase()) {
            None => None,
            Some(o) => Some(match o.as_str() {
                "ok" | "success" => Outcome::Ok,
                "rejected" | "denied" => Outcome::Rejected,
                "failed" | "failure" | "error" => Outcome::Failed,
                other => bail!("Unknown outcome '{}'. Use: ok, rejected, failed", other),
            }),
        },
        limit,
    };

    let summary = JournalReader::summarize(&entries);

    if summary_only {
        println!();
        println!("  {} {}", "Journal:".bold(), ws.journal_path().display().to_string().dimmed());
        println!();
        println!(
            "  {} total | {} transitions | {} tamper blocks | {} PIN rejections | {} failures",
            summary.total.to_string().bold(),
            summary.transitions.to_string().cyan().bold(),
            summary.tamper_blocks.to_string().yellow().bold(),
            summary.pin_rejections.to_string().red().bold(),
            summary.failures.to_string().red().bold(),
        );
        if let (Some(start), Some(end)) = (summary.start_time, summary.end_time) {
            println!("  Span: {}", format_duration((end - start).num_seconds()));
        }
        println!();
        return Ok(());
    }

    let filtered = JournalReader::filter_entries(&entries, &filter);
    println!();
    for entry in &filtered {
        println!("  {}", JournalReader::format_entry(entry));
    }
    if filtered.is_empty() {
        println!("  {} No entries match.", "ℹ".blue());
    }
    println!();
    println!(
        "  {} {}",
        "─".repeat(40).dimmed(),
        summary.one_line().dimmed()
    );
    println!();

    Ok(())
}
