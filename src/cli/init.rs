//! `lockwarden init`: write the configuration template.
//!
//! Creates `config.yaml` in the state directory (or at `--output`) with every
//! default spelled out, so an operator only edits what the deployment needs.

use crate::config::defaults::DEFAULT_CONFIG_YAML;
use crate::utils::paths;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

/// Run the `lockwarden init` command.
pub fn run_init(output: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match output {
        Some(path) => path,
        None => paths::config_path(&paths::state_dir()?),
    };

    if path.exists() && !force {
        println!();
        println!(
            "  {} {} already exists.",
            "ℹ".blue(),
            path.display().to_string().cyan()
        );
        println!("  Use {} to overwrite it.", "--force".bold());
        println!();
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    std::fs::write(&path, DEFAULT_CONFIG_YAML)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!();
    println!(
        "  {} Wrote {}",
        "✓".green().bold(),
        path.display().to_string().cyan()
    );
    println!();
    println!("  Next steps:");
    println!("    1. Set {} and change the {}", "server.status_url".bold(), "pin".bold());
    println!("    2. {}", "lockwarden check".bold());
    println!("    3. {}", "lockwarden setup --device-id <ID>".bold());
    println!();

    Ok(())
}
