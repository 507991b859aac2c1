//! Pure decision logic for the tamper watcher.
//!
//! `WatcherRules` is compiled once from configuration; `evaluate_event` maps
//! one foreground event plus the current policy facts to the actions to
//! perform. It touches no platform state, so it is tested directly.

use crate::config::types::AgentConfig;
use crate::utils::paths::{text_matches, CompiledMatcher};
use crate::watcher::types::{
    EnforcementAction, ForegroundEvent, Intervention, WatcherContext, WatcherDecision,
};
use anyhow::{Context, Result};

/// Compiled pattern sets.
#[derive(Debug, Clone)]
pub struct WatcherRules {
    own_package: String,
    restricted_packages: CompiledMatcher,
    /// Configured restricted text plus one `*name*` pattern per disguise name.
    restricted_text: Vec<String>,
    allowed_packages: CompiledMatcher,
    shade_packages: CompiledMatcher,
    denial_notice: String,
}

impl WatcherRules {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let watcher = &config.watcher;

        let mut restricted_text = watcher.restricted_text.clone();
        restricted_text.extend(
            config
                .disguise_names
                .iter()
                .filter(|name| !name.trim().is_empty())
                .map(|name| format!("*{}*", name.trim())),
        );

        Ok(Self {
            own_package: config.own_package.clone(),
            restricted_packages: CompiledMatcher::new(&watcher.restricted_packages)
                .context("Invalid pattern in watcher.restricted_packages")?,
            restricted_text,
            allowed_packages: CompiledMatcher::new(&watcher.allowed_packages)
                .context("Invalid pattern in watcher.allowed_packages")?,
            shade_packages: CompiledMatcher::new(&watcher.shade_packages)
                .context("Invalid pattern in watcher.shade_packages")?,
            denial_notice: watcher.denial_notice.clone(),
        })
    }

    pub fn own_package(&self) -> &str {
        &self.own_package
    }

    /// The first visible text (or class name) on a restricted page that hits
    /// a restricted text pattern.
    fn restricted_match(&self, event: &ForegroundEvent) -> Option<String> {
        if !self.restricted_packages.matches(&event.package) {
            return None;
        }
        event
            .texts
            .iter()
            .chain(event.class_name.iter())
            .find(|text| text_matches(text, &self.restricted_text))
            .cloned()
    }
}

/// Decide what to do about one foreground event.
///
/// Self-defense runs whenever protection is on; lock enforcement runs only
/// while locked outside a break. Both may fire for the same event.
pub fn evaluate_event(
    event: &ForegroundEvent,
    ctx: &WatcherContext,
    rules: &WatcherRules,
) -> WatcherDecision {
    let mut decision = WatcherDecision::default();

    // Our own surfaces (lock screen, setup) are never acted on.
    if event.package == rules.own_package {
        return decision;
    }

    if ctx.protection_enabled {
        if let Some(matched) = rules.restricted_match(event) {
            decision.interventions.push(Intervention::SelfDefense {
                package: event.package.clone(),
                matched,
            });
            decision.push_action(EnforcementAction::GoHome);
            decision.push_action(EnforcementAction::GoBack);
            decision.push_action(EnforcementAction::ShowNotice {
                message: rules.denial_notice.clone(),
            });
        }
    }

    if ctx.enforcing_lock {
        if rules.shade_packages.matches(&event.package) {
            decision.interventions.push(Intervention::NotificationShade {
                package: event.package.clone(),
            });
            decision.push_action(EnforcementAction::DismissNotificationShade);
            decision.push_action(EnforcementAction::GoBack);
            decision.push_action(EnforcementAction::BringLockToFront);
        } else if !rules.allowed_packages.matches(&event.package) {
            decision.interventions.push(Intervention::LockEnforcement {
                package: event.package.clone(),
            });
            decision.push_action(EnforcementAction::BringLockToFront);
        }
    }

    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> WatcherRules {
        WatcherRules::from_config(&AgentConfig::default()).unwrap()
    }

    const PROTECTED: WatcherContext = WatcherContext {
        protection_enabled: true,
        enforcing_lock: false,
    };

    const LOCKED: WatcherContext = WatcherContext {
        protection_enabled: true,
        enforcing_lock: true,
    };

    #[test]
    fn test_uninstall_page_in_settings_is_blocked() {
        let event = ForegroundEvent::new("com.android.settings")
            .with_text("App info")
            .with_text("Uninstall");
        let decision = evaluate_event(&event, &PROTECTED, &rules());
        assert_eq!(
            decision.actions[..2],
            [EnforcementAction::GoHome, EnforcementAction::GoBack]
        );
        assert!(matches!(
            decision.actions[2],
            EnforcementAction::ShowNotice { .. }
        ));
        assert!(matches!(
            &decision.interventions[0],
            Intervention::SelfDefense { matched, .. } if matched == "Uninstall"
        ));
    }

    #[test]
    fn test_disguise_name_on_restricted_page_is_blocked() {
        let event = ForegroundEvent::new("com.android.settings").with_text("DEVICE CARE");
        assert!(!evaluate_event(&event, &PROTECTED, &rules()).is_empty());
    }

    #[test]
    fn test_restricted_text_outside_restricted_package_is_ignored() {
        let event = ForegroundEvent::new("com.example.notes").with_text("How to uninstall apps");
        assert!(evaluate_event(&event, &PROTECTED, &rules()).is_empty());
    }

    #[test]
    fn test_settings_without_removal_text_is_allowed() {
        let event = ForegroundEvent::new("com.android.settings").with_text("Wi-Fi");
        assert!(evaluate_event(&event, &PROTECTED, &rules()).is_empty());
        // Settings is allow-listed, so the lock does not push it away either.
        assert!(evaluate_event(&event, &LOCKED, &rules()).is_empty());
    }

    #[test]
    fn test_self_defense_off_without_protection() {
        let event = ForegroundEvent::new("com.android.settings").with_text("Uninstall");
        let ctx = WatcherContext::default();
        assert!(evaluate_event(&event, &ctx, &rules()).is_empty());
    }

    #[test]
    fn test_lock_brings_surface_back_for_other_apps() {
        let event = ForegroundEvent::new("com.example.game");
        let decision = evaluate_event(&event, &LOCKED, &rules());
        assert_eq!(decision.actions, vec![EnforcementAction::BringLockToFront]);

        // Outside the lock the same app is left alone.
        assert!(evaluate_event(&event, &PROTECTED, &rules()).is_empty());
    }

    #[test]
    fn test_dialer_is_usable_while_locked() {
        let event = ForegroundEvent::new("com.android.dialer");
        assert!(evaluate_event(&event, &LOCKED, &rules()).is_empty());
    }

    #[test]
    fn test_notification_shade_dismissed_then_back() {
        let event = ForegroundEvent::new("com.android.systemui");
        let decision = evaluate_event(&event, &LOCKED, &rules());
        assert_eq!(
            decision.actions,
            vec![
                EnforcementAction::DismissNotificationShade,
                EnforcementAction::GoBack,
                EnforcementAction::BringLockToFront,
            ]
        );
    }

    #[test]
    fn test_own_package_ignored() {
        let event = ForegroundEvent::new("com.lockwarden.agent").with_text("Uninstall");
        assert!(evaluate_event(&event, &LOCKED, &rules()).is_empty());
    }

    #[test]
    fn test_class_name_counts_as_text() {
        let event = ForegroundEvent::new("com.android.packageinstaller")
            .with_class("com.android.packageinstaller.UninstallerActivity");
        assert!(!evaluate_event(&event, &PROTECTED, &rules()).is_empty());
    }
}
