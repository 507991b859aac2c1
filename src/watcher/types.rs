//! Types for the tamper watcher.
//!
//! The platform event bridge delivers one `ForegroundEvent` per foreground
//! UI change; the watcher answers with the `EnforcementAction`s to perform.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of UI change produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A new window came to the foreground.
    #[default]
    WindowStateChanged,
    /// The content of the foreground window changed.
    WindowContentChanged,
}

/// A foreground UI change reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForegroundEvent {
    /// Identifier of the application owning the foreground window.
    pub package: String,
    /// Window / activity class, when the platform reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Visible text collected from the window.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texts: Vec<String>,
    #[serde(default)]
    pub kind: EventKind,
}

impl ForegroundEvent {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            class_name: None,
            texts: Vec::new(),
            kind: EventKind::WindowStateChanged,
        }
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.texts.push(text.into());
        self
    }

    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A global action the platform performs on the watcher's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EnforcementAction {
    GoHome,
    GoBack,
    /// Surface a short denial notice to the user.
    ShowNotice { message: String },
    /// Force the lock surface back to the foreground.
    BringLockToFront,
    /// Collapse the notification shade.
    DismissNotificationShade,
}

impl fmt::Display for EnforcementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnforcementAction::GoHome => write!(f, "go_home"),
            EnforcementAction::GoBack => write!(f, "go_back"),
            EnforcementAction::ShowNotice { .. } => write!(f, "show_notice"),
            EnforcementAction::BringLockToFront => write!(f, "bring_lock_to_front"),
            EnforcementAction::DismissNotificationShade => write!(f, "dismiss_notification_shade"),
        }
    }
}

/// Policy facts the watcher needs for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatcherContext {
    /// Self-defense is armed.
    pub protection_enabled: bool,
    /// Locked and outside any break window.
    pub enforcing_lock: bool,
}

/// Why the watcher intervened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Intervention {
    /// A restricted page (settings / package management) showed text
    /// referencing removal or the agent itself.
    SelfDefense { package: String, matched: String },
    /// A non-allow-listed app came up while locked.
    LockEnforcement { package: String },
    /// The notification shade was pulled down while locked.
    NotificationShade { package: String },
}

/// The watcher's answer for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherDecision {
    pub interventions: Vec<Intervention>,
    pub actions: Vec<EnforcementAction>,
}

impl WatcherDecision {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Append an action unless it is already queued.
    pub(crate) fn push_action(&mut self, action: EnforcementAction) {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_from_bridge_json() {
        let event: ForegroundEvent = serde_json::from_str(
            r#"{"package": "com.android.settings", "texts": ["App info", "Uninstall"]}"#,
        )
        .unwrap();
        assert_eq!(event.package, "com.android.settings");
        assert_eq!(event.kind, EventKind::WindowStateChanged);
        assert_eq!(event.texts.len(), 2);
    }

    #[test]
    fn test_action_wire_format() {
        let json = serde_json::to_string(&EnforcementAction::ShowNotice {
            message: "Blocked".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"action":"show_notice","message":"Blocked"}"#);
        let json = serde_json::to_string(&EnforcementAction::GoHome).unwrap();
        assert_eq!(json, r#"{"action":"go_home"}"#);
    }

    #[test]
    fn test_push_action_dedupes() {
        let mut decision = WatcherDecision::default();
        decision.push_action(EnforcementAction::GoBack);
        decision.push_action(EnforcementAction::GoBack);
        assert_eq!(decision.actions.len(), 1);
    }
}
