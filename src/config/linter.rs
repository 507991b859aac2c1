//! Configuration linter, run by `lockwarden check`.
//!
//! Flags deployments that will run but leave gaps: the shipped PIN still in
//! use, a platform that cannot pin the lock surface, empty pattern sets that
//! switch off parts of the tamper watcher.

use crate::config::types::{AgentConfig, PlatformKind, RestrictionRetention, DEFAULT_PIN};
use colored::Colorize;

/// A lint finding about the configuration.
#[derive(Debug)]
pub struct LintWarning {
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Enforcement is weaker than it looks
    Warning,
    /// Worth knowing, not necessarily wrong
    Info,
}

impl LintWarning {
    fn warn_with_fix(msg: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: msg.into(),
            suggestion: Some(fix.into()),
        }
    }

    fn info(msg: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: msg.into(),
            suggestion: None,
        }
    }

    /// Format for terminal output.
    pub fn display(&self) -> String {
        let icon = match self.severity {
            Severity::Warning => "⚠".yellow().to_string(),
            Severity::Info => "ℹ".blue().to_string(),
        };
        let mut out = format!("  {} {}", icon, self.message);
        if let Some(ref suggestion) = self.suggestion {
            out.push_str(&format!("\n    {}: {}", "Fix".green(), suggestion));
        }
        out
    }
}

/// Lint a configuration and return findings.
pub fn lint_config(config: &AgentConfig) -> Vec<LintWarning> {
    let mut warnings = Vec::new();

    check_pin(config, &mut warnings);
    check_platform(config, &mut warnings);
    check_watcher_patterns(config, &mut warnings);
    check_retention(config, &mut warnings);

    warnings
}

fn check_pin(config: &AgentConfig, warnings: &mut Vec<LintWarning>) {
    if config.pin == DEFAULT_PIN {
        warnings.push(LintWarning::warn_with_fix(
            "The shipped default PIN is in use; anyone who knows it can unlock the device",
            "Set a deployment-specific 'pin' in config.yaml",
        ));
    }
    if config.pin.len() < 4 {
        warnings.push(LintWarning::warn_with_fix(
            format!("PIN has only {} digits", config.pin.len()),
            "Use at least 4 digits",
        ));
    }
}

fn check_platform(config: &AgentConfig, warnings: &mut Vec<LintWarning>) {
    let platform = &config.platform;
    match platform.kind {
        PlatformKind::Simulated => warnings.push(LintWarning::info(
            "Platform is 'simulated'; nothing on the device is actually enforced",
        )),
        PlatformKind::Shell => {
            if !platform.device_owner {
                warnings.push(LintWarning::warn_with_fix(
                    "Agent is not provisioned as device owner; the lock runs in degraded mode (no pinning, no restrictions)",
                    "Provision as device owner and set 'platform.device_owner: true'",
                ));
            } else if platform
                .commands
                .start_lock_task
                .as_deref()
                .map_or(true, |t| t.trim().is_empty())
            {
                warnings.push(LintWarning::warn_with_fix(
                    "Device owner is set but no 'start_lock_task' command is configured; pinning stays unavailable",
                    "Add 'platform.commands.start_lock_task' and 'stop_lock_task'",
                ));
            }
        }
    }
}

fn check_watcher_patterns(config: &AgentConfig, warnings: &mut Vec<LintWarning>) {
    let watcher = &config.watcher;
    if watcher.restricted_packages.is_empty() {
        warnings.push(LintWarning::warn_with_fix(
            "No restricted packages; self-defense never triggers",
            "Add settings and package-installer packages to 'watcher.restricted_packages'",
        ));
    }
    if watcher.restricted_text.is_empty() && config.disguise_names.is_empty() {
        warnings.push(LintWarning::warn_with_fix(
            "No restricted text and no disguise names; removal pages are never recognized",
            "Add patterns like \"*uninstall*\" to 'watcher.restricted_text'",
        ));
    }
    if watcher.allowed_packages.is_empty() {
        warnings.push(LintWarning::info(
            "No allowed packages; while locked even the dialer is pushed back behind the lock",
        ));
    }
    if watcher.shade_packages.is_empty() {
        warnings.push(LintWarning::info(
            "No shade packages; the notification shade is not dismissed while locked",
        ));
    }
}

fn check_retention(config: &AgentConfig, warnings: &mut Vec<LintWarning>) {
    if config.kiosk.restriction_retention == RestrictionRetention::ClearAll {
        warnings.push(LintWarning::info(
            "Restrictions are cleared on every unlock, including factory-reset and safe-boot blocks",
        ));
    }
}
