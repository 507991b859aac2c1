//! `lockwarden setup`: register the device and arm protection.
//!
//! Flow:
//!   1. Save the device id the management server knows this device by
//!   2. Check that every required OS privilege has been granted
//!   3. Confirm setup: SETUP_PENDING -> ACTIVE, protection on
//!
//! Running the command is the confirmation step.

use crate::agent::SOURCE_CLI;
use crate::cli::Workspace;
use crate::policy::types::LockdownState;
use crate::policy::TransitionError;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use colored::Colorize;

/// Run the `lockwarden setup` command.
pub fn run_setup(device_id: Option<String>) -> Result<()> {
    let ws = Workspace::load()?;
    let agent = ws.agent(SOURCE_CLI)?;

    let state = agent.state();
    if state != LockdownState::SetupPending {
        println!();
        println!("  {} Already set up (state: {}).", "✓".green().bold(), state);
        if state == LockdownState::Unprotected {
            println!(
                "  To configure again, run {} first.",
                "lockwarden reset-setup".bold()
            );
        }
        println!();
        return Ok(());
    }

    if let Some(id) = device_id {
        if id.trim().is_empty() {
            bail!("Device id must not be empty");
        }
        agent
            .save_device_id(&id)
            .context("Failed to save the device id")?;
    }

    let privileges = agent.platform().privileges.privileges();
    println!();
    println!("  {}", "Privileges".bold());
    for (name, granted) in [
        ("device admin", privileges.device_admin),
        ("accessibility", privileges.accessibility),
        ("overlay", privileges.overlay),
        ("notifications", privileges.notifications),
    ] {
        let mark = if granted {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("    {} {}", mark, name);
    }
    println!();

    match agent.complete_setup(Utc::now()) {
        Ok(transition) => {
            println!("  {} Setup complete: {}", "✓".green().bold(), transition);
            println!(
                "  Start the agent with {} to begin polling.",
                "lockwarden run".bold()
            );
            println!();
            Ok(())
        }
        Err(TransitionError::MissingDeviceId) => {
            bail!("No device id saved. Pass --device-id <ID>")
        }
        Err(TransitionError::MissingPrivileges(missing)) => bail!(
            "Grant these privileges and run setup again: {}",
            missing.join(", ")
        ),
        Err(e) => Err(e).context("Setup could not be completed"),
    }
}
