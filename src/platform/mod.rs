//! Capability traits for everything the agent asks of the operating system.
//!
//! Privileged operations (pinning, restrictions, silent install/uninstall),
//! UI actuation and launcher aliasing sit behind these traits. A concrete
//! backend is picked at composition time: `ShellPlatform` drives the device
//! through configured shell command templates, `SimulatedPlatform` records
//! calls in memory for tests and dry runs.

pub mod shell;
pub mod simulated;

use crate::policy::types::PrivilegeReport;
use crate::watcher::types::EnforcementAction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use shell::ShellPlatform;
pub use simulated::{PlatformCall, SimulatedPlatform};

#[derive(Error, Debug)]
pub enum PlatformError {
    /// The capability is not available on this device / backend.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    /// The backend tried and the OS refused.
    #[error("{operation} failed: {detail}")]
    CommandFailed { operation: String, detail: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Device-wide restrictions applied while locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    FactoryReset,
    SafeBoot,
    AddUser,
    DebuggingFeatures,
    UsbFileTransfer,
    MountPhysicalMedia,
    AdjustVolume,
}

impl Restriction {
    pub const ALL: [Restriction; 7] = [
        Restriction::FactoryReset,
        Restriction::SafeBoot,
        Restriction::AddUser,
        Restriction::DebuggingFeatures,
        Restriction::UsbFileTransfer,
        Restriction::MountPhysicalMedia,
        Restriction::AdjustVolume,
    ];

    /// Restrictions kept while the device is still protected overall.
    pub const BASELINE: [Restriction; 4] = [
        Restriction::FactoryReset,
        Restriction::SafeBoot,
        Restriction::AddUser,
        Restriction::DebuggingFeatures,
    ];

    /// The platform's user-restriction key.
    pub fn key(&self) -> &'static str {
        match self {
            Restriction::FactoryReset => "no_factory_reset",
            Restriction::SafeBoot => "no_safe_boot",
            Restriction::AddUser => "no_add_user",
            Restriction::DebuggingFeatures => "no_debugging_features",
            Restriction::UsbFileTransfer => "no_usb_file_transfer",
            Restriction::MountPhysicalMedia => "no_physical_media",
            Restriction::AdjustVolume => "no_adjust_volume",
        }
    }

    pub fn is_baseline(&self) -> bool {
        Self::BASELINE.contains(self)
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Device-owner management authority.
pub trait DeviceOwner: Send + Sync {
    /// Whether privileged device-owner authority is held at all.
    fn is_device_owner(&self) -> bool;
    /// Pin the agent as the sole foreground task.
    fn start_lock_task(&self) -> Result<(), PlatformError>;
    fn stop_lock_task(&self) -> Result<(), PlatformError>;
    /// Disable (or re-enable) status-bar pulldown and the power/reboot menu.
    fn set_system_affordances_disabled(&self, disabled: bool) -> Result<(), PlatformError>;
    fn set_restriction(&self, restriction: Restriction, enabled: bool)
        -> Result<(), PlatformError>;
    fn set_uninstall_blocked(&self, blocked: bool) -> Result<(), PlatformError>;
}

/// Package installation and removal.
pub trait PackageManager: Send + Sync {
    /// Whether a privileged, non-interactive install session is available.
    fn can_install_silently(&self) -> bool;
    fn install_silently(&self, artifact: &Path) -> Result<(), PlatformError>;
    /// Whether a privileged, non-interactive removal is available.
    fn can_uninstall_silently(&self) -> bool;
    fn uninstall_silently(&self, package: &str) -> Result<(), PlatformError>;
    /// Standard removal request; the user has to confirm it.
    fn request_uninstall(&self, package: &str) -> Result<(), PlatformError>;
}

/// Global UI actions performed on behalf of the watcher and the lock surface.
pub trait UiActuator: Send + Sync {
    fn perform(&self, action: &EnforcementAction) -> Result<(), PlatformError>;
}

/// Launcher entry aliasing for the disguise presentation.
pub trait LauncherAlias: Send + Sync {
    fn supports_hiding(&self) -> bool;
    fn set_alias_enabled(&self, enabled: bool) -> Result<(), PlatformError>;
}

/// Reports which OS privileges have been granted to the agent.
pub trait PrivilegeProbe: Send + Sync {
    fn privileges(&self) -> PrivilegeReport;
}

/// A backend implementing every capability.
pub trait PlatformBackend:
    DeviceOwner + PackageManager + UiActuator + LauncherAlias + PrivilegeProbe
{
}

impl<T> PlatformBackend for T where
    T: DeviceOwner + PackageManager + UiActuator + LauncherAlias + PrivilegeProbe
{
}

/// The capability handles each component receives.
#[derive(Clone)]
pub struct Platform {
    pub device_owner: Arc<dyn DeviceOwner>,
    pub packages: Arc<dyn PackageManager>,
    pub ui: Arc<dyn UiActuator>,
    pub launcher: Arc<dyn LauncherAlias>,
    pub privileges: Arc<dyn PrivilegeProbe>,
}

impl Platform {
    /// Hand out one backend behind every capability.
    pub fn from_backend<T: PlatformBackend + 'static>(backend: Arc<T>) -> Self {
        Self {
            device_owner: backend.clone(),
            packages: backend.clone(),
            ui: backend.clone(),
            launcher: backend.clone(),
            privileges: backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_is_subset_of_all() {
        for r in Restriction::BASELINE {
            assert!(Restriction::ALL.contains(&r));
            assert!(r.is_baseline());
        }
        assert!(!Restriction::AdjustVolume.is_baseline());
    }

    #[test]
    fn test_restriction_keys() {
        assert_eq!(Restriction::FactoryReset.key(), "no_factory_reset");
        assert_eq!(Restriction::MountPhysicalMedia.to_string(), "no_physical_media");
    }
}
