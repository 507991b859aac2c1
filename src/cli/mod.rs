//! `lockwarden` subcommands.
//!
//! Every command resolves the state directory (`$LOCKWARDEN_HOME`, else
//! `~/.lockwarden`), loads `config.yaml` from it and, where it needs to act
//! on the device, composes an `Agent`.

pub mod check;
pub mod init;
pub mod log;
pub mod pin;
pub mod run;
pub mod setup;
pub mod status;
pub mod sync;

use crate::agent::Agent;
use crate::config::{parse_config_file, AgentConfig};
use crate::utils::paths;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Where a command reads and writes, plus the configuration found there.
pub struct Workspace {
    pub state_dir: PathBuf,
    pub config: AgentConfig,
}

impl Workspace {
    pub fn load() -> Result<Self> {
        let state_dir = paths::state_dir()?;
        let config = parse_config_file(paths::config_path(&state_dir))?;
        Ok(Self { state_dir, config })
    }

    pub fn config_path(&self) -> PathBuf {
        paths::config_path(&self.state_dir)
    }

    pub fn journal_path(&self) -> PathBuf {
        paths::journal_path(&self.state_dir)
    }

    /// Compose an agent over this workspace, creating the directory first.
    pub fn agent(&self, label: &'static str) -> Result<Arc<Agent>> {
        std::fs::create_dir_all(&self.state_dir).with_context(|| {
            format!(
                "Failed to create state directory: {}",
                self.state_dir.display()
            )
        })?;
        Agent::from_config(self.config.clone(), &self.state_dir, label)
    }
}
