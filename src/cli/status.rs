//! `lockwarden status` (the default command) and `lockwarden dial`.
//!
//! Status only reads the state file; it never moves the lockdown engine.

use crate::audit::JournalReader;
use crate::cli::Workspace;
use crate::policy::types::{DeviceRecord, LockdownState};
use crate::store::{FileStore, PolicyStore};
use crate::surface::LockNotice;
use crate::utils::paths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
struct StatusView {
    state: LockdownState,
    record: DeviceRecord,
    notice: LockNotice,
}

fn load_view(ws: &Workspace) -> Result<StatusView> {
    let kv = FileStore::open(paths::store_path(&ws.state_dir))
        .context("Failed to open the policy store")?;
    let store = PolicyStore::new(Arc::new(kv));
    let record = store.record();
    Ok(StatusView {
        state: store
            .lockdown_state()
            .unwrap_or(LockdownState::SetupPending),
        notice: LockNotice::from_record(&record),
        record,
    })
}

/// Run the `lockwarden status` command.
pub fn run_status(json: bool) -> Result<()> {
    let ws = Workspace::load()?;
    let view = load_view(&ws)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&view).context("Failed to serialize status")?
        );
        return Ok(());
    }

    print_status(&ws, &view, Utc::now());

    println!("  {}", "Commands:".dimmed());
    println!("    {}          check with the server now", "lockwarden sync".bold());
    println!("    {}   take a break from the lock", "lockwarden break --pin".bold());
    println!("    {}           see what happened", "lockwarden log".bold());
    println!("    {}         validate the configuration", "lockwarden check".bold());
    println!();
    Ok(())
}

/// Run the `lockwarden dial` command: the reserved code opens the
/// administration view, anything else is ignored.
pub fn run_dial(code: &str) -> Result<()> {
    let ws = Workspace::load()?;
    if code.trim() != ws.config.admin_dial_code {
        tracing::debug!("dial code is not the administration code, ignoring");
        return Ok(());
    }

    let view = load_view(&ws)?;
    print_status(&ws, &view, Utc::now());

    println!("  {}", "Administration:".bold());
    match view.state {
        LockdownState::SetupPending => {
            println!(
                "    {} to register this device",
                "lockwarden setup --device-id <ID>".bold()
            );
        }
        LockdownState::Unprotected => {
            println!(
                "    {} to configure this device again",
                "lockwarden reset-setup".bold()
            );
        }
        _ => {
            println!("    {}              master unlock", "lockwarden unlock --pin".bold());
            println!(
                "    {}   drop protection so the agent can be removed",
                "lockwarden remove-protection --pin".bold()
            );
        }
    }
    println!(
        "    {}                     edit and validate {}",
        "lockwarden check".bold(),
        ws.config_path().display().to_string().dimmed()
    );
    println!();
    Ok(())
}

fn print_status(ws: &Workspace, view: &StatusView, now: DateTime<Utc>) {
    let record = &view.record;
    let headline = match view.state {
        LockdownState::SetupPending => "setup pending".yellow(),
        LockdownState::Active => "active".green(),
        LockdownState::Locked => "LOCKED".red().bold(),
        LockdownState::OnBreak => "on break".yellow(),
        LockdownState::Unprotected => "unprotected".dimmed(),
    };

    println!();
    println!("  {}  {}", "lockwarden".bold(), headline);
    println!("  {}", "━".repeat(41).dimmed());
    println!();
    println!(
        "  Device:     {}",
        record
            .device_id
            .as_deref()
            .map(|id| id.cyan().to_string())
            .unwrap_or_else(|| "not registered".dimmed().to_string())
    );
    println!(
        "  Protection: {}",
        if record.protection_enabled {
            "on".green()
        } else {
            "off".dimmed()
        }
    );
    if view.state == LockdownState::OnBreak {
        if let Some(end) = record.break_end_time {
            let left = (end - now).num_seconds().max(0);
            println!("  Break:      {} left", format_duration(left));
        }
    }
    if let Some(ref message) = view.notice.message {
        println!("  Message:    {}", message);
    }
    if let Some(ref call_to) = view.notice.call_to {
        println!("  Call:       {}", call_to.bold());
    }
    if view.notice.due_amount != 0 {
        println!("  Due:        {}", view.notice.due_amount);
    }
    println!(
        "  Last sync:  {}",
        record
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
            .dimmed()
    );

    if let Ok(entries) = JournalReader::with_path(ws.journal_path()).read_all() {
        if !entries.is_empty() {
            let summary = JournalReader::summarize(&entries);
            println!("  Journal:    {}", summary.one_line().dimmed());
        }
    }
    println!();
}

pub(crate) fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
    }
}
