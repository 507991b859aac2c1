//! Core types for the lockdown policy.
//!
//! `DeviceRecord` is the durable view of everything the server and the local
//! PIN actions have decided about this device. `LockdownState` is the state
//! the lockdown engine is currently enforcing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-facing lock flag, persisted as the "phone state".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Active,
    Locked,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockState::Active => write!(f, "active"),
            LockState::Locked => write!(f, "locked"),
        }
    }
}

impl LockState {
    /// Parse a stored value. Accepts the legacy upper-case spellings too.
    pub fn from_str_loose(s: &str) -> Option<LockState> {
        match s.trim().to_lowercase().as_str() {
            "active" | "unlocked" => Some(LockState::Active),
            "locked" | "frozen" => Some(LockState::Locked),
            _ => None,
        }
    }
}

/// The state the lockdown engine is enforcing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockdownState {
    /// Device not yet configured: privileges, device id or confirmation missing.
    SetupPending,
    /// Managed and protected, nothing enforced right now.
    Active,
    /// Restricted to the lock surface.
    Locked,
    /// Lock suspended until the break window closes.
    OnBreak,
    /// Protection removed; enforcement subsystem inert.
    Unprotected,
}

impl fmt::Display for LockdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockdownState::SetupPending => write!(f, "setup_pending"),
            LockdownState::Active => write!(f, "active"),
            LockdownState::Locked => write!(f, "locked"),
            LockdownState::OnBreak => write!(f, "on_break"),
            LockdownState::Unprotected => write!(f, "unprotected"),
        }
    }
}

impl LockdownState {
    pub fn from_str_loose(s: &str) -> Option<LockdownState> {
        match s.trim().to_lowercase().as_str() {
            "setup_pending" | "setup" => Some(LockdownState::SetupPending),
            "active" => Some(LockdownState::Active),
            "locked" => Some(LockdownState::Locked),
            "on_break" | "break" => Some(LockdownState::OnBreak),
            "unprotected" => Some(LockdownState::Unprotected),
            _ => None,
        }
    }

    /// Whether the lock surface must be enforced in this state.
    pub fn enforces_lock(&self) -> bool {
        matches!(self, LockdownState::Locked)
    }

    /// Whether the enforcement subsystem (watcher self-defense, restrictions)
    /// is armed at all.
    pub fn is_protected(&self) -> bool {
        matches!(
            self,
            LockdownState::Active | LockdownState::Locked | LockdownState::OnBreak
        )
    }
}

/// Durable per-install record. Built from the key/value store; any missing
/// key takes the first-run default (ACTIVE, unprotected, setup incomplete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DeviceRecord {
    pub device_id: Option<String>,
    pub setup_complete: bool,
    pub protection_enabled: bool,
    pub lock_state: LockState,
    pub break_end_time: Option<DateTime<Utc>>,
    pub uninstall_allowed: bool,
    pub due_amount: i64,
    pub message: Option<String>,
    pub call_to: Option<String>,
    pub hide_icon: bool,
    pub installed_version: i64,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// True while a break window is still open at `now`.
    pub fn break_active(&self, now: DateTime<Utc>) -> bool {
        self.break_end_time.map_or(false, |end| end > now)
    }

    /// The lock the server currently wants, after applying the
    /// "locked requires protection" rule.
    pub fn effective_lock(&self) -> LockState {
        if self.protection_enabled {
            self.lock_state
        } else {
            LockState::Active
        }
    }
}

/// A time-boxed suspension of lock enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl BreakWindow {
    pub fn starting_at(start_time: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start_time,
            end_time: start_time + length,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        now < self.end_time
    }

    /// Time left in the window, zero once it has closed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        if self.is_open(now) {
            self.end_time - now
        } else {
            Duration::zero()
        }
    }
}

/// Which OS privileges the agent currently holds. Setup cannot complete
/// until every required one is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PrivilegeReport {
    /// Device-admin (or stronger) management authority.
    pub device_admin: bool,
    /// Subscription to system-wide foreground UI events.
    pub accessibility: bool,
    /// Permission to draw the lock surface over other apps.
    pub overlay: bool,
    /// Permission to post denial notices.
    pub notifications: bool,
}

impl PrivilegeReport {
    pub fn all() -> Self {
        Self {
            device_admin: true,
            accessibility: true,
            overlay: true,
            notifications: true,
        }
    }

    pub fn all_granted(&self) -> bool {
        self.device_admin && self.accessibility && self.overlay && self.notifications
    }

    /// Names of privileges still missing, for setup prompts.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.device_admin {
            missing.push("device_admin");
        }
        if !self.accessibility {
            missing.push("accessibility");
        }
        if !self.overlay {
            missing.push("overlay");
        }
        if !self.notifications {
            missing.push("notifications");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_is_first_run_safe() {
        let record = DeviceRecord::default();
        assert_eq!(record.lock_state, LockState::Active);
        assert!(!record.protection_enabled);
        assert!(!record.setup_complete);
        assert!(!record.uninstall_allowed);
        assert_eq!(record.effective_lock(), LockState::Active);
    }

    #[test]
    fn test_effective_lock_requires_protection() {
        let record = DeviceRecord {
            lock_state: LockState::Locked,
            protection_enabled: false,
            ..Default::default()
        };
        assert_eq!(record.effective_lock(), LockState::Active);
    }

    #[test]
    fn test_break_window_remaining() {
        let start = Utc::now();
        let window = BreakWindow::starting_at(start, Duration::minutes(2));
        assert!(window.is_open(start));
        assert_eq!(window.remaining(start), Duration::minutes(2));
        assert!(!window.is_open(start + Duration::minutes(2)));
        assert_eq!(window.remaining(start + Duration::minutes(5)), Duration::zero());
    }

    #[test]
    fn test_privilege_report_missing() {
        let report = PrivilegeReport {
            device_admin: true,
            overlay: true,
            ..Default::default()
        };
        assert!(!report.all_granted());
        assert_eq!(report.missing(), vec!["accessibility", "notifications"]);
        assert!(PrivilegeReport::all().all_granted());
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(LockState::from_str_loose("LOCKED"), Some(LockState::Locked));
        assert_eq!(
            LockdownState::from_str_loose("on_break"),
            Some(LockdownState::OnBreak)
        );
        assert_eq!(LockdownState::from_str_loose("bogus"), None);
    }
}
