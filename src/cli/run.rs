//! `lockwarden run`: the long-running agent.
//!
//! 1. Boot recovery: reconcile the stored state and re-apply its effects
//! 2. Schedule an immediate status check and the periodic one
//! 3. Follow state written by CLI invocations (PIN actions) until Ctrl-C
//! 4. Cancel every job and stop the lock surface

use crate::agent::SOURCE_AGENT;
use crate::cli::Workspace;
use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::time::Duration;

/// How often the state file is checked for changes made by other processes.
pub const LOCAL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Run the `lockwarden run` command.
pub async fn run_agent() -> Result<()> {
    let ws = Workspace::load()?;
    let agent = ws.agent(SOURCE_AGENT)?;

    let close_surface = agent.surface().close_on_unlock(agent.unlock_signal());
    let recovered = agent.boot(Utc::now()).context("Boot recovery failed")?;
    agent.schedule_background();

    println!();
    println!(
        "  {} lockwarden running (state: {})",
        "●".green().bold(),
        agent.state().to_string().bold()
    );
    for transition in &recovered {
        println!("    {} {}", "→".dimmed(), transition);
    }
    println!(
        "  Polling {} every {} min. Press Ctrl-C to stop.",
        ws.config.server.status_url.cyan(),
        ws.config.poll_interval_minutes
    );
    println!();

    let mut unlocks = agent.unlock_signal().subscribe();
    let mut follow = tokio::time::interval(LOCAL_POLL_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = follow.tick() => {
                match agent.follow_local_changes(Utc::now()) {
                    Ok(Some((from, to))) => tracing::info!(%from, %to, "state changed locally"),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "could not read local state changes"),
                }
            }
            Ok(()) = unlocks.changed() => {
                tracing::info!(state = %agent.state(), "device unlocked");
            }
        }
    }

    agent.shutdown();
    close_surface.abort();
    println!();
    println!("  {} lockwarden stopped (state: {})", "●".dimmed(), agent.state());
    println!();
    Ok(())
}
