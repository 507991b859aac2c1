//! Platform backend that drives the device through shell commands.
//!
//! Each capability maps to a command template from the configuration,
//! executed with `sh -c`. Placeholder values are single-quoted before
//! substitution. A missing template means the capability is unavailable and
//! the call returns `PlatformError::Unsupported`.

use crate::config::types::{CommandTemplates, PlatformConfig};
use crate::platform::{
    DeviceOwner, LauncherAlias, PackageManager, PlatformError, PrivilegeProbe, Restriction,
    UiActuator,
};
use crate::policy::types::PrivilegeReport;
use crate::watcher::types::EnforcementAction;
use std::path::Path;
use std::process::Command;

/// Result of one template execution.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub struct ShellPlatform {
    package: String,
    alias: String,
    lock_activity: String,
    device_owner: bool,
    commands: CommandTemplates,
}

impl ShellPlatform {
    pub fn new(own_package: impl Into<String>, config: &PlatformConfig) -> Self {
        Self {
            package: own_package.into(),
            alias: config.launcher_alias.clone(),
            lock_activity: config.lock_activity.clone(),
            device_owner: config.device_owner,
            commands: config.commands.clone(),
        }
    }

    /// Expand a template with the fixed placeholders plus `extra`.
    fn render(&self, template: &str, extra: &[(&str, &str)]) -> String {
        let mut rendered = template.to_string();
        for (name, value) in extra {
            rendered = rendered.replace(&format!("{{{}}}", name), &shell_quote(value));
        }
        rendered
            .replace("{package}", &shell_quote(&self.package))
            .replace("{alias}", &shell_quote(&self.alias))
            .replace("{lock_activity}", &shell_quote(&self.lock_activity))
    }

    fn run(
        &self,
        operation: &'static str,
        template: &Option<String>,
        extra: &[(&str, &str)],
    ) -> Result<CommandOutput, PlatformError> {
        let template = template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or(PlatformError::Unsupported(operation))?;
        let command = self.render(template, extra);
        tracing::debug!(operation, %command, "running platform command");

        let output = Command::new("sh").arg("-c").arg(&command).output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Run a template and require a zero exit code.
    fn run_checked(
        &self,
        operation: &'static str,
        template: &Option<String>,
        extra: &[(&str, &str)],
    ) -> Result<(), PlatformError> {
        let output = self.run(operation, template, extra)?;
        if output.exit_code == 0 {
            Ok(())
        } else {
            Err(PlatformError::CommandFailed {
                operation: operation.to_string(),
                detail: format!(
                    "exit code {}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
            })
        }
    }

    /// Probes count as granted only on a clean zero exit.
    fn probe(&self, operation: &'static str, template: &Option<String>) -> bool {
        matches!(self.run(operation, template, &[]), Ok(out) if out.exit_code == 0)
    }

    fn has(template: &Option<String>) -> bool {
        template.as_deref().map_or(false, |t| !t.trim().is_empty())
    }
}

/// Single-quote a value for `sh`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

impl DeviceOwner for ShellPlatform {
    fn is_device_owner(&self) -> bool {
        self.device_owner && Self::has(&self.commands.start_lock_task)
    }

    fn start_lock_task(&self) -> Result<(), PlatformError> {
        self.run_checked("start_lock_task", &self.commands.start_lock_task, &[])
    }

    fn stop_lock_task(&self) -> Result<(), PlatformError> {
        self.run_checked("stop_lock_task", &self.commands.stop_lock_task, &[])
    }

    fn set_system_affordances_disabled(&self, disabled: bool) -> Result<(), PlatformError> {
        if disabled {
            self.run_checked("disable_affordances", &self.commands.disable_affordances, &[])
        } else {
            self.run_checked("enable_affordances", &self.commands.enable_affordances, &[])
        }
    }

    fn set_restriction(
        &self,
        restriction: Restriction,
        enabled: bool,
    ) -> Result<(), PlatformError> {
        let extra = [("restriction", restriction.key())];
        if enabled {
            self.run_checked("add_restriction", &self.commands.add_restriction, &extra)
        } else {
            self.run_checked("clear_restriction", &self.commands.clear_restriction, &extra)
        }
    }

    fn set_uninstall_blocked(&self, blocked: bool) -> Result<(), PlatformError> {
        if blocked {
            self.run_checked("block_uninstall", &self.commands.block_uninstall, &[])
        } else {
            self.run_checked("unblock_uninstall", &self.commands.unblock_uninstall, &[])
        }
    }
}

impl PackageManager for ShellPlatform {
    fn can_install_silently(&self) -> bool {
        self.device_owner && Self::has(&self.commands.install)
    }

    fn install_silently(&self, artifact: &Path) -> Result<(), PlatformError> {
        if !self.can_install_silently() {
            return Err(PlatformError::Unsupported("silent install"));
        }
        let artifact = artifact.to_string_lossy();
        self.run_checked("install", &self.commands.install, &[("artifact", artifact.as_ref())])
    }

    fn can_uninstall_silently(&self) -> bool {
        self.device_owner && Self::has(&self.commands.uninstall)
    }

    fn uninstall_silently(&self, package: &str) -> Result<(), PlatformError> {
        if !self.can_uninstall_silently() {
            return Err(PlatformError::Unsupported("silent uninstall"));
        }
        self.run_checked("uninstall", &self.commands.uninstall, &[("package", package)])
    }

    fn request_uninstall(&self, package: &str) -> Result<(), PlatformError> {
        self.run_checked(
            "request_uninstall",
            &self.commands.request_uninstall,
            &[("package", package)],
        )
    }
}

impl UiActuator for ShellPlatform {
    fn perform(&self, action: &EnforcementAction) -> Result<(), PlatformError> {
        match action {
            EnforcementAction::GoHome => self.run_checked("go_home", &self.commands.go_home, &[]),
            EnforcementAction::GoBack => self.run_checked("go_back", &self.commands.go_back, &[]),
            EnforcementAction::ShowNotice { message } => self.run_checked(
                "show_notice",
                &self.commands.show_notice,
                &[("message", message.as_str())],
            ),
            EnforcementAction::BringLockToFront => {
                self.run_checked("show_lock_surface", &self.commands.show_lock_surface, &[])
            }
            EnforcementAction::DismissNotificationShade => {
                self.run_checked("dismiss_shade", &self.commands.dismiss_shade, &[])
            }
        }
    }
}

impl LauncherAlias for ShellPlatform {
    fn supports_hiding(&self) -> bool {
        Self::has(&self.commands.enable_alias) && Self::has(&self.commands.disable_alias)
    }

    fn set_alias_enabled(&self, enabled: bool) -> Result<(), PlatformError> {
        if enabled {
            self.run_checked("enable_alias", &self.commands.enable_alias, &[])
        } else {
            self.run_checked("disable_alias", &self.commands.disable_alias, &[])
        }
    }
}

impl PrivilegeProbe for ShellPlatform {
    fn privileges(&self) -> PrivilegeReport {
        PrivilegeReport {
            device_admin: self.probe("check_device_admin", &self.commands.check_device_admin),
            accessibility: self
                .probe("check_accessibility", &self.commands.check_accessibility),
            overlay: self.probe("check_overlay", &self.commands.check_overlay),
            notifications: self
                .probe("check_notifications", &self.commands.check_notifications),
        }
    }
}
