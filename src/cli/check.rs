//! `lockwarden check`: validate and lint the configuration.

use crate::config::{linter, parse_config_file};
use crate::utils::paths;
use crate::watcher::WatcherRules;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

/// Run the `lockwarden check` command.
pub fn run_check(config_path: Option<PathBuf>) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => paths::config_path(&paths::state_dir()?),
    };

    let config = parse_config_file(&path)?;
    WatcherRules::from_config(&config).context("Config parsed but watcher patterns are invalid")?;

    println!();
    if path.exists() {
        println!("  {} Configuration is valid!", "✓".green().bold());
        println!("  File:     {}", path.display().to_string().dimmed());
    } else {
        println!(
            "  {} No config file at {}, using built-in defaults.",
            "ℹ".blue(),
            path.display().to_string().dimmed()
        );
    }
    println!("  Server:   {}", config.server.status_url.cyan());
    println!("  Break:    {} min", config.break_minutes);
    println!("  Polling:  every {} min", config.poll_interval_minutes);
    println!(
        "  Platform: {:?}{}",
        config.platform.kind,
        if config.platform.device_owner {
            " (device owner)"
        } else {
            ""
        }
    );

    let warnings = linter::lint_config(&config);
    println!();
    if warnings.is_empty() {
        println!("  {} No issues found.", "✓".green());
    } else {
        println!(
            "  {} {} {}:",
            "─".repeat(20).dimmed(),
            warnings.len(),
            if warnings.len() == 1 {
                "suggestion"
            } else {
                "suggestions"
            }
        );
        println!();
        for warning in &warnings {
            println!("{}", warning.display());
        }
    }
    println!();

    Ok(())
}
