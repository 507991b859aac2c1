//! `lockwarden sync`: the manual "check now" action.
//!
//! Unlike the scheduled checks, a failure here is shown to the user.

use crate::agent::{SyncError, SyncReport, SOURCE_CLI};
use crate::cli::Workspace;
use crate::command::{UninstallOutcome, UpdateOutcome};
use anyhow::{bail, Result};
use chrono::Utc;
use colored::Colorize;

/// Run the `lockwarden sync` command.
pub async fn run_sync() -> Result<()> {
    let ws = Workspace::load()?;
    let agent = ws.agent(SOURCE_CLI)?;

    let report = match agent.sync_once(Utc::now()).await {
        Ok(report) => report,
        Err(SyncError::Remote(e)) => {
            println!();
            println!(
                "  {} Could not reach the server. The device keeps its current state ({}).",
                "⚠".yellow(),
                agent.state()
            );
            println!();
            bail!("{}", e)
        }
        Err(e) => return Err(e.into()),
    };

    println!();
    match report {
        SyncReport::NoDeviceId => {
            println!(
                "  {} No device id saved yet. Run {} first.",
                "ℹ".blue(),
                "lockwarden setup --device-id <ID>".bold()
            );
        }
        SyncReport::Uninstall { outcome } => match outcome {
            UninstallOutcome::Silent => {
                println!("  {} Server requested removal; agent removed.", "✓".green().bold())
            }
            UninstallOutcome::Requested => println!(
                "  {} Server requested removal; confirm it on the device.",
                "ℹ".blue()
            ),
            UninstallOutcome::Failed { reason } => {
                bail!("Server requested removal but it failed: {}", reason)
            }
        },
        SyncReport::Applied {
            diff,
            transitions,
            update,
        } => {
            println!(
                "  {} Status applied ({} field(s) changed). State: {}",
                "✓".green().bold(),
                diff.changes.len(),
                agent.state().to_string().bold()
            );
            for transition in &transitions {
                println!("    {} {}", "→".dimmed(), transition);
            }
            match update {
                Some(UpdateOutcome::Installed { version }) => {
                    println!("  {} Updated to version {}", "✓".green(), version)
                }
                Some(UpdateOutcome::Unsupported) => println!(
                    "  {} An update is available but cannot be installed silently.",
                    "⚠".yellow()
                ),
                Some(UpdateOutcome::Failed { reason }) => {
                    println!("  {} Update failed: {}", "⚠".yellow(), reason)
                }
                Some(UpdateOutcome::NotNewer { .. }) | None => {}
            }
        }
    }
    println!();
    Ok(())
}
