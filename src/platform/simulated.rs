//! In-memory platform backend.
//!
//! Records every call so tests can assert on what the agent asked the OS to
//! do, and can be configured to lack capabilities or fail specific
//! operations. `platform.kind: simulated` selects it for dry runs.

use crate::platform::{
    DeviceOwner, LauncherAlias, PackageManager, PlatformError, PrivilegeProbe, Restriction,
    UiActuator,
};
use crate::policy::types::PrivilegeReport;
use crate::watcher::types::EnforcementAction;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    StartLockTask,
    StopLockTask,
    Affordances { disabled: bool },
    Restriction { restriction: Restriction, enabled: bool },
    UninstallBlocked(bool),
    InstallSilently(PathBuf),
    UninstallSilently(String),
    RequestUninstall(String),
    Ui(EnforcementAction),
    AliasEnabled(bool),
}

#[derive(Debug, Default)]
struct SimState {
    calls: Vec<PlatformCall>,
    pinned: bool,
    affordances_disabled: bool,
    restrictions: HashSet<Restriction>,
    uninstall_blocked: bool,
    alias_enabled: bool,
}

/// Simulated device. Defaults: device owner, silent install/uninstall and
/// alias hiding all available, every privilege granted, nothing failing.
#[derive(Debug)]
pub struct SimulatedPlatform {
    device_owner: bool,
    silent_packages: bool,
    alias_hiding: bool,
    privileges: PrivilegeReport,
    failing: HashSet<&'static str>,
    state: Mutex<SimState>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self {
            device_owner: true,
            silent_packages: true,
            alias_hiding: true,
            privileges: PrivilegeReport::all(),
            failing: HashSet::new(),
            state: Mutex::new(SimState {
                alias_enabled: true,
                ..Default::default()
            }),
        }
    }
}

impl SimulatedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device without device-owner authority or silent package sessions.
    pub fn unprivileged() -> Self {
        Self {
            device_owner: false,
            silent_packages: false,
            ..Self::default()
        }
    }

    pub fn with_device_owner(mut self, owner: bool) -> Self {
        self.device_owner = owner;
        self
    }

    pub fn with_silent_packages(mut self, available: bool) -> Self {
        self.silent_packages = available;
        self
    }

    pub fn with_alias_hiding(mut self, supported: bool) -> Self {
        self.alias_hiding = supported;
        self
    }

    pub fn with_privileges(mut self, privileges: PrivilegeReport) -> Self {
        self.privileges = privileges;
        self
    }

    /// Make the named operation fail (e.g. `"install"`, `"restriction"`).
    pub fn failing(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.calls.clear();
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.state.lock().map(|s| s.pinned).unwrap_or(false)
    }

    pub fn affordances_disabled(&self) -> bool {
        self.state.lock().map(|s| s.affordances_disabled).unwrap_or(false)
    }

    pub fn active_restrictions(&self) -> HashSet<Restriction> {
        self.state
            .lock()
            .map(|s| s.restrictions.clone())
            .unwrap_or_default()
    }

    pub fn uninstall_blocked(&self) -> bool {
        self.state.lock().map(|s| s.uninstall_blocked).unwrap_or(false)
    }

    pub fn alias_enabled(&self) -> bool {
        self.state.lock().map(|s| s.alias_enabled).unwrap_or(true)
    }

    /// UI actions performed so far, in order.
    pub fn ui_actions(&self) -> Vec<EnforcementAction> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                PlatformCall::Ui(action) => Some(action),
                _ => None,
            })
            .collect()
    }

    /// Record `call`, then fail if `operation` is configured to fail,
    /// otherwise apply `effect` to the simulated state.
    fn record(
        &self,
        operation: &'static str,
        call: PlatformCall,
        effect: impl FnOnce(&mut SimState),
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().map_err(|_| PlatformError::CommandFailed {
            operation: operation.to_string(),
            detail: "simulator state poisoned".to_string(),
        })?;
        state.calls.push(call);
        if self.failing.contains(operation) {
            return Err(PlatformError::CommandFailed {
                operation: operation.to_string(),
                detail: "simulated failure".to_string(),
            });
        }
        effect(&mut state);
        Ok(())
    }
}

impl DeviceOwner for SimulatedPlatform {
    fn is_device_owner(&self) -> bool {
        self.device_owner
    }

    fn start_lock_task(&self) -> Result<(), PlatformError> {
        if !self.device_owner {
            return Err(PlatformError::Unsupported("lock task"));
        }
        self.record("lock_task", PlatformCall::StartLockTask, |s| s.pinned = true)
    }

    fn stop_lock_task(&self) -> Result<(), PlatformError> {
        self.record("lock_task", PlatformCall::StopLockTask, |s| s.pinned = false)
    }

    fn set_system_affordances_disabled(&self, disabled: bool) -> Result<(), PlatformError> {
        if !self.device_owner {
            return Err(PlatformError::Unsupported("system affordances"));
        }
        self.record("affordances", PlatformCall::Affordances { disabled }, |s| {
            s.affordances_disabled = disabled
        })
    }

    fn set_restriction(
        &self,
        restriction: Restriction,
        enabled: bool,
    ) -> Result<(), PlatformError> {
        if !self.device_owner {
            return Err(PlatformError::Unsupported("user restrictions"));
        }
        self.record(
            "restriction",
            PlatformCall::Restriction {
                restriction,
                enabled,
            },
            |s| {
                if enabled {
                    s.restrictions.insert(restriction);
                } else {
                    s.restrictions.remove(&restriction);
                }
            },
        )
    }

    fn set_uninstall_blocked(&self, blocked: bool) -> Result<(), PlatformError> {
        if !self.device_owner {
            return Err(PlatformError::Unsupported("uninstall blocking"));
        }
        self.record("uninstall_block", PlatformCall::UninstallBlocked(blocked), |s| {
            s.uninstall_blocked = blocked
        })
    }
}

impl PackageManager for SimulatedPlatform {
    fn can_install_silently(&self) -> bool {
        self.silent_packages
    }

    fn install_silently(&self, artifact: &Path) -> Result<(), PlatformError> {
        if !self.silent_packages {
            return Err(PlatformError::Unsupported("silent install"));
        }
        self.record(
            "install",
            PlatformCall::InstallSilently(artifact.to_path_buf()),
            |_| {},
        )
    }

    fn can_uninstall_silently(&self) -> bool {
        self.silent_packages
    }

    fn uninstall_silently(&self, package: &str) -> Result<(), PlatformError> {
        if !self.silent_packages {
            return Err(PlatformError::Unsupported("silent uninstall"));
        }
        self.record(
            "uninstall",
            PlatformCall::UninstallSilently(package.to_string()),
            |_| {},
        )
    }

    fn request_uninstall(&self, package: &str) -> Result<(), PlatformError> {
        self.record(
            "request_uninstall",
            PlatformCall::RequestUninstall(package.to_string()),
            |_| {},
        )
    }
}

impl UiActuator for SimulatedPlatform {
    fn perform(&self, action: &EnforcementAction) -> Result<(), PlatformError> {
        self.record("ui", PlatformCall::Ui(action.clone()), |_| {})
    }
}

impl LauncherAlias for SimulatedPlatform {
    fn supports_hiding(&self) -> bool {
        self.alias_hiding
    }

    fn set_alias_enabled(&self, enabled: bool) -> Result<(), PlatformError> {
        if !self.alias_hiding {
            return Err(PlatformError::Unsupported("launcher alias"));
        }
        self.record("alias", PlatformCall::AliasEnabled(enabled), |s| {
            s.alias_enabled = enabled
        })
    }
}

impl PrivilegeProbe for SimulatedPlatform {
    fn privileges(&self) -> PrivilegeReport {
        self.privileges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_and_state() {
        let sim = SimulatedPlatform::new();
        sim.start_lock_task().unwrap();
        sim.set_restriction(Restriction::SafeBoot, true).unwrap();
        assert!(sim.is_pinned());
        assert!(sim.active_restrictions().contains(&Restriction::SafeBoot));
        assert_eq!(sim.calls().len(), 2);
    }

    #[test]
    fn test_failing_operation_is_recorded_but_not_applied() {
        let sim = SimulatedPlatform::new().failing("restriction");
        assert!(sim.set_restriction(Restriction::AddUser, true).is_err());
        assert!(sim.active_restrictions().is_empty());
        assert_eq!(sim.calls().len(), 1);
    }

    #[test]
    fn test_unprivileged_refuses_owner_operations() {
        let sim = SimulatedPlatform::unprivileged();
        assert!(!sim.is_device_owner());
        assert!(matches!(
            sim.start_lock_task(),
            Err(PlatformError::Unsupported(_))
        ));
        assert!(!sim.can_install_silently());
        assert!(sim.request_uninstall("com.example").is_ok());
    }
}
