//! PIN-gated local actions: `unlock`, `break`, `remove-protection`, plus
//! `reset-setup`.
//!
//! A wrong PIN is reported and journaled; there is no attempt counter.

use crate::agent::SOURCE_CLI;
use crate::cli::status::format_duration;
use crate::cli::Workspace;
use crate::policy::{PinError, TransitionError};
use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;

/// Which PIN-gated action to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinAction {
    Unlock,
    Break,
    RemoveProtection,
}

/// Run a PIN-gated action.
pub fn run_pin_action(action: PinAction, pin: &str) -> Result<()> {
    let ws = Workspace::load()?;
    let agent = ws.agent(SOURCE_CLI)?;
    let now = Utc::now();

    let result = match action {
        PinAction::Unlock => agent.full_unlock(pin, now).map(|t| (t, None)),
        PinAction::Break => agent
            .grant_break(pin, now)
            .map(|(t, window)| (t, Some(window))),
        PinAction::RemoveProtection => agent.remove_protection(pin, now).map(|t| (t, None)),
    };

    match result {
        Ok((transition, window)) => {
            println!();
            println!("  {} {}", "✓".green().bold(), transition);
            if let Some(window) = window {
                println!(
                    "  Break ends in {} ({}).",
                    format_duration(window.remaining(now).num_seconds()),
                    window.end_time.format("%H:%M:%S UTC")
                );
            }
            if action != PinAction::Break {
                println!("  The agent may now be removed from this device.");
            }
            println!();
            Ok(())
        }
        Err(TransitionError::Pin(PinError::Mismatch)) => {
            anyhow::bail!("Incorrect PIN")
        }
        Err(e) => Err(e).context("Action refused"),
    }
}

/// Run the `lockwarden reset-setup` command.
pub fn run_reset_setup() -> Result<()> {
    let ws = Workspace::load()?;
    let agent = ws.agent(SOURCE_CLI)?;
    let transition = agent
        .reset_setup(Utc::now())
        .context("Setup can only be reset once protection is removed")?;
    println!();
    println!("  {} {}", "✓".green().bold(), transition);
    println!(
        "  Run {} to configure the device again.",
        "lockwarden setup --device-id <ID>".bold()
    );
    println!();
    Ok(())
}
