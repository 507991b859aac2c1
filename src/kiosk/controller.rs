//! Kiosk controller: single-app pinning and device restrictions.
//!
//! With device-owner authority the lock surface is pinned, system
//! affordances are disabled and every `Restriction` is applied while
//! LOCKED. Without it every call is a no-op and the lock falls back to the
//! tamper watcher and the enforcement ticker (`KioskMode::Degraded`).
//!
//! Individual platform failures are logged and skipped so that one refused
//! restriction does not leave the rest unapplied.

use crate::config::types::RestrictionRetention;
use crate::platform::{DeviceOwner, PlatformError, Restriction};
use serde::Serialize;
use std::sync::Arc;

/// How the lock is being held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KioskMode {
    /// Pinned by the platform; the foreground cannot change.
    Pinned,
    /// No (working) pinning; the agent keeps pulling the lock surface back.
    Degraded,
}

pub struct KioskController {
    owner: Arc<dyn DeviceOwner>,
    retention: RestrictionRetention,
}

impl KioskController {
    pub fn new(owner: Arc<dyn DeviceOwner>, retention: RestrictionRetention) -> Self {
        Self { owner, retention }
    }

    pub fn is_privileged(&self) -> bool {
        self.owner.is_device_owner()
    }

    /// Enter the locked kiosk.
    pub fn engage(&self) -> KioskMode {
        if !self.is_privileged() {
            tracing::info!("no device-owner authority, lock runs degraded");
            return KioskMode::Degraded;
        }

        self.apply_restrictions(&Restriction::ALL, true);
        log_failure("block uninstall", self.owner.set_uninstall_blocked(true));
        log_failure(
            "disable system affordances",
            self.owner.set_system_affordances_disabled(true),
        );

        match self.owner.start_lock_task() {
            Ok(()) => {
                tracing::info!("lock task pinned");
                KioskMode::Pinned
            }
            Err(e) => {
                tracing::warn!(error = %e, "pinning failed, lock runs degraded");
                KioskMode::Degraded
            }
        }
    }

    /// Leave the kiosk. `still_protected` tells the retention policy whether
    /// the device remains under protection (ACTIVE) or not (UNPROTECTED).
    pub fn disengage(&self, still_protected: bool) {
        if !self.is_privileged() {
            return;
        }

        log_failure("stop lock task", self.owner.stop_lock_task());
        log_failure(
            "enable system affordances",
            self.owner.set_system_affordances_disabled(false),
        );

        let retain = still_protected && self.retention == RestrictionRetention::RetainWhileProtected;
        if retain {
            let lifted: Vec<Restriction> = Restriction::ALL
                .into_iter()
                .filter(|r| !r.is_baseline())
                .collect();
            self.apply_restrictions(&lifted, false);
            tracing::info!("lock released, baseline restrictions retained");
        } else {
            self.apply_restrictions(&Restriction::ALL, false);
            log_failure("unblock uninstall", self.owner.set_uninstall_blocked(false));
            tracing::info!("lock released, all restrictions cleared");
        }
    }

    /// Baseline protection for a protected, unlocked device: the baseline
    /// restrictions and the uninstall block, nothing pinned.
    pub fn protect(&self) {
        if !self.is_privileged() {
            return;
        }
        self.apply_restrictions(&Restriction::BASELINE, true);
        log_failure("block uninstall", self.owner.set_uninstall_blocked(true));
    }

    /// Clear everything ahead of self-removal.
    pub fn release_for_removal(&self) {
        if !self.is_privileged() {
            return;
        }
        log_failure("stop lock task", self.owner.stop_lock_task());
        log_failure(
            "enable system affordances",
            self.owner.set_system_affordances_disabled(false),
        );
        self.apply_restrictions(&Restriction::ALL, false);
        log_failure("unblock uninstall", self.owner.set_uninstall_blocked(false));
    }

    fn apply_restrictions(&self, restrictions: &[Restriction], enabled: bool) {
        for restriction in restrictions {
            if let Err(e) = self.owner.set_restriction(*restriction, enabled) {
                tracing::warn!(%restriction, enabled, error = %e, "restriction change failed");
            }
        }
    }
}

fn log_failure(operation: &str, result: Result<(), PlatformError>) {
    if let Err(e) = result {
        tracing::warn!(operation, error = %e, "privileged operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PlatformCall, SimulatedPlatform};
    use std::collections::HashSet;

    fn controller(
        sim: &Arc<SimulatedPlatform>,
        retention: RestrictionRetention,
    ) -> KioskController {
        KioskController::new(sim.clone(), retention)
    }

    #[test]
    fn test_engage_pins_and_restricts() {
        let sim = Arc::new(SimulatedPlatform::new());
        let kiosk = controller(&sim, RestrictionRetention::default());
        assert_eq!(kiosk.engage(), KioskMode::Pinned);
        assert!(sim.is_pinned());
        assert!(sim.affordances_disabled());
        assert!(sim.uninstall_blocked());
        assert_eq!(sim.active_restrictions().len(), Restriction::ALL.len());
    }

    #[test]
    fn test_without_device_owner_everything_is_noop() {
        let sim = Arc::new(SimulatedPlatform::unprivileged());
        let kiosk = controller(&sim, RestrictionRetention::default());
        assert_eq!(kiosk.engage(), KioskMode::Degraded);
        kiosk.disengage(true);
        kiosk.release_for_removal();
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn test_one_failing_restriction_does_not_block_the_rest() {
        let sim = Arc::new(SimulatedPlatform::new().failing("restriction"));
        let kiosk = controller(&sim, RestrictionRetention::default());
        assert_eq!(kiosk.engage(), KioskMode::Pinned);
        let attempted = sim
            .calls()
            .into_iter()
            .filter(|c| matches!(c, PlatformCall::Restriction { .. }))
            .count();
        assert_eq!(attempted, Restriction::ALL.len());
        assert!(sim.is_pinned());
    }

    #[test]
    fn test_failed_pinning_is_degraded() {
        let sim = Arc::new(SimulatedPlatform::new().failing("lock_task"));
        let kiosk = controller(&sim, RestrictionRetention::default());
        assert_eq!(kiosk.engage(), KioskMode::Degraded);
    }

    #[test]
    fn test_retain_while_protected_keeps_baseline() {
        let sim = Arc::new(SimulatedPlatform::new());
        let kiosk = controller(&sim, RestrictionRetention::RetainWhileProtected);
        kiosk.engage();
        kiosk.disengage(true);

        let expected: HashSet<Restriction> = Restriction::BASELINE.into_iter().collect();
        assert_eq!(sim.active_restrictions(), expected);
        assert!(sim.uninstall_blocked());
        assert!(!sim.is_pinned());
        assert!(!sim.affordances_disabled());
    }

    #[test]
    fn test_unprotected_release_clears_everything() {
        let sim = Arc::new(SimulatedPlatform::new());
        let kiosk = controller(&sim, RestrictionRetention::RetainWhileProtected);
        kiosk.engage();
        kiosk.disengage(false);
        assert!(sim.active_restrictions().is_empty());
        assert!(!sim.uninstall_blocked());
    }

    #[test]
    fn test_clear_all_ignores_protection() {
        let sim = Arc::new(SimulatedPlatform::new());
        let kiosk = controller(&sim, RestrictionRetention::ClearAll);
        kiosk.engage();
        kiosk.disengage(true);
        assert!(sim.active_restrictions().is_empty());
        assert!(!sim.uninstall_blocked());
    }

    #[test]
    fn test_release_for_removal() {
        let sim = Arc::new(SimulatedPlatform::new());
        let kiosk = controller(&sim, RestrictionRetention::RetainWhileProtected);
        kiosk.protect();
        assert!(sim.uninstall_blocked());
        kiosk.release_for_removal();
        assert!(sim.active_restrictions().is_empty());
        assert!(!sim.uninstall_blocked());
    }
}
