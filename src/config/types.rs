//! Configuration types for the agent.
//!
//! Every field has a default so that a partial YAML file (or none at all)
//! still yields a runnable agent.

use serde::{Deserialize, Serialize};

/// Default shared PIN. `lockwarden check` warns while it is in use.
pub const DEFAULT_PIN: &str = "1133";

/// Top-level agent configuration (`config.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server: ServerConfig,
    /// Numeric PIN for unlock, break and protection removal. Compared in
    /// plaintext; there is no attempt throttling.
    pub pin: String,
    /// Length of a break window.
    pub break_minutes: i64,
    /// Interval of the periodic status check.
    pub poll_interval_minutes: u64,
    /// The agent's own package identifier.
    pub own_package: String,
    /// Names the agent is disguised under; text mentioning them on a
    /// restricted page is treated as a removal attempt.
    pub disguise_names: Vec<String>,
    /// Reserved dial code that opens the administration view.
    pub admin_dial_code: String,
    /// Version code of the running build, compared against the server's.
    pub installed_version: i64,
    pub kiosk: KioskConfig,
    pub watcher: WatcherConfig,
    pub platform: PlatformConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pin: DEFAULT_PIN.to_string(),
            break_minutes: 2,
            poll_interval_minutes: 15,
            own_package: "com.lockwarden.agent".to_string(),
            disguise_names: vec!["Lockwarden".to_string(), "Device Care".to_string()],
            admin_dial_code: "*#1133#".to_string(),
            installed_version: 1,
            kiosk: KioskConfig::default(),
            watcher: WatcherConfig::default(),
            platform: PlatformConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Endpoint receiving `{"device_id": ...}` and answering with the status.
    pub status_url: String,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            status_url: "https://manage.example.com/api/device/status".to_string(),
            timeout_secs: 30,
        }
    }
}

/// What happens to device restrictions when the lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionRetention {
    /// Clear every restriction on release.
    ClearAll,
    /// Keep the baseline restrictions and the uninstall block while the
    /// device is still protected overall.
    #[default]
    RetainWhileProtected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KioskConfig {
    pub restriction_retention: RestrictionRetention,
}

/// Pattern sets used by the tamper watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// System settings and package-management front-ends (globs).
    pub restricted_packages: Vec<String>,
    /// Text on a restricted page that indicates a removal attempt
    /// (case-insensitive, `*` wildcards). Disguise names are added to these.
    pub restricted_text: Vec<String>,
    /// Apps usable while locked (globs).
    pub allowed_packages: Vec<String>,
    /// Packages that host the notification shade (globs).
    pub shade_packages: Vec<String>,
    /// Notice shown when a restricted page is blocked.
    pub denial_notice: String,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            restricted_packages: vec![
                "com.android.settings".to_string(),
                "com.android.packageinstaller".to_string(),
                "com.google.android.packageinstaller".to_string(),
                "com.android.vending".to_string(),
                "com.google.android.permissioncontroller".to_string(),
            ],
            restricted_text: vec![
                "*uninstall*".to_string(),
                "*disable*".to_string(),
                "*deactivate*".to_string(),
                "*force stop*".to_string(),
                "*device admin*".to_string(),
                "*clear storage*".to_string(),
                "*factory reset*".to_string(),
            ],
            allowed_packages: vec![
                "com.android.dialer".to_string(),
                "com.google.android.dialer".to_string(),
                "com.android.server.telecom".to_string(),
                "com.android.phone".to_string(),
                "com.android.incallui".to_string(),
                "com.android.settings".to_string(),
            ],
            shade_packages: vec!["com.android.systemui".to_string()],
            denial_notice: "This action is blocked by your device administrator".to_string(),
        }
    }
}

/// Which platform backend to compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlatformKind {
    /// Drive the device through shell command templates.
    #[default]
    Shell,
    /// Record calls in memory; nothing touches the OS.
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub kind: PlatformKind,
    /// Whether the agent was provisioned with device-owner authority.
    pub device_owner: bool,
    /// Launcher alias component toggled for the disguise.
    pub launcher_alias: String,
    /// Component that renders the lock surface.
    pub lock_activity: String,
    pub commands: CommandTemplates,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            kind: PlatformKind::Shell,
            device_owner: false,
            launcher_alias: "com.lockwarden.agent/.LauncherAlias".to_string(),
            lock_activity: "com.lockwarden.agent/.LockActivity".to_string(),
            commands: CommandTemplates::default(),
        }
    }
}

/// Shell command templates, run with `sh -c`. Placeholders: `{package}`,
/// `{alias}`, `{lock_activity}`, `{restriction}`, `{artifact}`, `{message}`.
/// A template left empty marks the capability as unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub start_lock_task: Option<String>,
    pub stop_lock_task: Option<String>,
    pub disable_affordances: Option<String>,
    pub enable_affordances: Option<String>,
    pub add_restriction: Option<String>,
    pub clear_restriction: Option<String>,
    pub block_uninstall: Option<String>,
    pub unblock_uninstall: Option<String>,
    pub install: Option<String>,
    pub uninstall: Option<String>,
    pub request_uninstall: Option<String>,
    pub go_home: Option<String>,
    pub go_back: Option<String>,
    pub show_notice: Option<String>,
    pub show_lock_surface: Option<String>,
    pub dismiss_shade: Option<String>,
    pub enable_alias: Option<String>,
    pub disable_alias: Option<String>,
    pub check_device_admin: Option<String>,
    pub check_accessibility: Option<String>,
    pub check_overlay: Option<String>,
    pub check_notifications: Option<String>,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        let s = |v: &str| Some(v.to_string());
        Self {
            // Pinning has no portable shell equivalent; provisioning tools
            // fill these in for device-owner builds.
            start_lock_task: None,
            stop_lock_task: None,
            disable_affordances: s("cmd statusbar disable-for-setup true"),
            enable_affordances: s("cmd statusbar disable-for-setup false"),
            add_restriction: s("pm set-user-restriction {restriction} 1"),
            clear_restriction: s("pm set-user-restriction {restriction} 0"),
            block_uninstall: None,
            unblock_uninstall: None,
            install: s("pm install -r {artifact}"),
            uninstall: s("pm uninstall {package}"),
            request_uninstall: s("am start -a android.intent.action.DELETE -d package:{package}"),
            go_home: s("input keyevent KEYCODE_HOME"),
            go_back: s("input keyevent KEYCODE_BACK"),
            show_notice: s("cmd notification post -t Lockwarden lockwarden-denied {message}"),
            show_lock_surface: s("am start -n {lock_activity}"),
            dismiss_shade: s("cmd statusbar collapse"),
            enable_alias: s("pm enable {alias}"),
            disable_alias: s("pm disable {alias}"),
            check_device_admin: s("dumpsys device_policy | grep -q {package}"),
            check_accessibility: s(
                "settings get secure enabled_accessibility_services | grep -q {package}",
            ),
            check_overlay: s("appops get {package} SYSTEM_ALERT_WINDOW | grep -q allow"),
            check_notifications: s("appops get {package} POST_NOTIFICATION | grep -qv deny"),
        }
    }
}
