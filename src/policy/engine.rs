//! Lockdown state machine.
//!
//! Owns the current `LockdownState` and moves it in response to three kinds
//! of input: a merged server status (`apply_sync`), time passing
//! (`reconcile`, used for break expiry and boot recovery) and local
//! PIN-gated actions. Every move is persisted under `lockdown_state` and
//! returned as a `Transition` for the journal.
//!
//! Remote directives win over the local cache, except that an open break
//! window keeps the device out of LOCKED until it closes. When the server
//! cannot be reached, reconciliation runs against the last stored values
//! (fail-static).

use crate::policy::types::{BreakWindow, LockState, LockdownState, PrivilegeReport};
use crate::remote::merge::StatusDiff;
use crate::store::{PolicyStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must not be empty")]
    Empty,
    #[error("incorrect PIN")]
    Mismatch,
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error(transparent)]
    Pin(#[from] PinError),
    #[error("{action} is not possible while {state}")]
    NotAllowed {
        action: &'static str,
        state: LockdownState,
    },
    #[error("required privileges not granted: {}", .0.join(", "))]
    MissingPrivileges(Vec<&'static str>),
    #[error("no device id has been saved")]
    MissingDeviceId,
    #[error("failed to persist state: {0}")]
    Store(#[from] StoreError),
}

/// Why the engine moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    SetupCompleted,
    RemoteLock,
    RemoteUnlock,
    RemoteProtectionOff,
    RemoteProtectionOn,
    BreakGranted,
    BreakExpired,
    FullUnlock,
    ProtectionRemoved,
    SetupReset,
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionCause::SetupCompleted => "setup completed",
            TransitionCause::RemoteLock => "server locked the device",
            TransitionCause::RemoteUnlock => "server unlocked the device",
            TransitionCause::RemoteProtectionOff => "server disabled protection",
            TransitionCause::RemoteProtectionOn => "server enabled protection",
            TransitionCause::BreakGranted => "break granted",
            TransitionCause::BreakExpired => "break expired",
            TransitionCause::FullUnlock => "full unlock",
            TransitionCause::ProtectionRemoved => "protection removed",
            TransitionCause::SetupReset => "setup reset",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: LockdownState,
    pub to: LockdownState,
    pub cause: TransitionCause,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.from, self.to, self.cause)
    }
}

pub struct LockdownEngine {
    store: PolicyStore,
    pin: String,
    break_length: Duration,
    state: LockdownState,
}

impl LockdownEngine {
    /// Load the persisted state. A store that has never held one (fresh
    /// install, or an older record) gets a state derived from its flags,
    /// which is SETUP_PENDING for an empty store.
    pub fn restore(
        store: PolicyStore,
        pin: impl Into<String>,
        break_length: Duration,
    ) -> Result<Self, StoreError> {
        let state = match store.lockdown_state() {
            Some(state) => state,
            None => {
                let state = initial_state(&store);
                store.set_lockdown_state(state)?;
                state
            }
        };
        tracing::debug!(%state, "restored lockdown state");
        Ok(Self {
            store,
            pin: pin.into(),
            break_length,
            state,
        })
    }

    pub fn state(&self) -> LockdownState {
        self.state
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub fn break_length(&self) -> Duration {
        self.break_length
    }

    /// The open break window, if any.
    pub fn break_window(&self, now: DateTime<Utc>) -> Option<BreakWindow> {
        if self.state != LockdownState::OnBreak {
            return None;
        }
        let end = self.store.break_end_time()?;
        let window = BreakWindow {
            start_time: end - self.break_length,
            end_time: end,
        };
        window.is_open(now).then_some(window)
    }

    // ── Setup ──

    /// SETUP_PENDING -> ACTIVE. Calling this is the user's confirmation; it
    /// still requires every privilege and a saved device id.
    pub fn complete_setup(
        &mut self,
        privileges: &PrivilegeReport,
    ) -> Result<Transition, TransitionError> {
        self.require("complete setup", &[LockdownState::SetupPending])?;
        if !privileges.all_granted() {
            return Err(TransitionError::MissingPrivileges(privileges.missing()));
        }
        if self.store.device_id().is_none() {
            return Err(TransitionError::MissingDeviceId);
        }

        self.store.set_setup_complete(true)?;
        self.store.set_protection_enabled(true)?;
        Ok(self.move_to(LockdownState::Active, TransitionCause::SetupCompleted)?)
    }

    /// UNPROTECTED -> SETUP_PENDING so the device can be configured again.
    pub fn reset_setup(&mut self) -> Result<Transition, TransitionError> {
        self.require("reset setup", &[LockdownState::Unprotected])?;
        self.store.set_setup_complete(false)?;
        Ok(self.move_to(LockdownState::SetupPending, TransitionCause::SetupReset)?)
    }

    // ── Remote input ──

    /// Recompute the state after a status merge.
    pub fn apply_sync(
        &mut self,
        diff: &StatusDiff,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transition>, StoreError> {
        self.settle(diff.protection_changed(), now)
    }

    /// Recompute the state from stored values alone (break expiry, boot,
    /// or a sync that could not reach the server).
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Result<Vec<Transition>, StoreError> {
        self.settle(None, now)
    }

    fn settle(
        &mut self,
        mut protection_change: Option<bool>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transition>, StoreError> {
        let mut transitions = Vec::new();
        // At most UNPROTECTED -> ACTIVE -> LOCKED in one pass.
        for _ in 0..4 {
            let Some((to, cause)) = self.next_step(protection_change, now) else {
                break;
            };
            protection_change = None;
            transitions.push(self.move_to(to, cause)?);
        }
        Ok(transitions)
    }

    fn next_step(
        &self,
        protection_change: Option<bool>,
        now: DateTime<Utc>,
    ) -> Option<(LockdownState, TransitionCause)> {
        use LockdownState::*;

        let record = self.store.record();
        let lock = record.effective_lock();

        match self.state {
            SetupPending => None,
            Unprotected => match protection_change {
                Some(true) if record.setup_complete => Some((Active, TransitionCause::RemoteProtectionOn)),
                Some(true) => Some((SetupPending, TransitionCause::RemoteProtectionOn)),
                _ => None,
            },
            Active | Locked | OnBreak if protection_change == Some(false) => {
                Some((Unprotected, TransitionCause::RemoteProtectionOff))
            }
            Active => match lock {
                LockState::Locked if record.break_active(now) => {
                    Some((OnBreak, TransitionCause::RemoteLock))
                }
                LockState::Locked => Some((Locked, TransitionCause::RemoteLock)),
                LockState::Active => None,
            },
            Locked => match lock {
                LockState::Active => Some((Active, TransitionCause::RemoteUnlock)),
                LockState::Locked => None,
            },
            OnBreak => match lock {
                LockState::Active if record.break_active(now) => {
                    Some((Active, TransitionCause::RemoteUnlock))
                }
                LockState::Active => Some((Active, TransitionCause::BreakExpired)),
                LockState::Locked if record.break_active(now) => None,
                LockState::Locked => Some((Locked, TransitionCause::BreakExpired)),
            },
        }
    }

    // ── PIN-gated actions ──

    /// LOCKED -> ON_BREAK for `break_length`.
    pub fn grant_break(
        &mut self,
        pin: &str,
        now: DateTime<Utc>,
    ) -> Result<(Transition, BreakWindow), TransitionError> {
        self.verify_pin(pin)?;
        self.require("grant a break", &[LockdownState::Locked])?;

        let window = BreakWindow::starting_at(now, self.break_length);
        self.store.set_break_end_time(Some(window.end_time))?;
        let transition = self.move_to(LockdownState::OnBreak, TransitionCause::BreakGranted)?;
        Ok((transition, window))
    }

    /// Master unlock: back to ACTIVE with protection off, uninstall allowed
    /// and setup reset.
    pub fn full_unlock(&mut self, pin: &str) -> Result<Transition, TransitionError> {
        self.verify_pin(pin)?;
        self.require(
            "unlock",
            &[
                LockdownState::Active,
                LockdownState::Locked,
                LockdownState::OnBreak,
            ],
        )?;

        self.store.set_uninstall_allowed(true)?;
        self.store.set_setup_complete(false)?;
        self.store.set_lock_state(LockState::Active)?;
        self.store.set_break_end_time(None)?;
        Ok(self.move_to(LockdownState::Active, TransitionCause::FullUnlock)?)
    }

    /// Explicit removal of protection: -> UNPROTECTED, uninstall allowed.
    pub fn remove_protection(&mut self, pin: &str) -> Result<Transition, TransitionError> {
        self.verify_pin(pin)?;
        self.require(
            "remove protection",
            &[
                LockdownState::Active,
                LockdownState::Locked,
                LockdownState::OnBreak,
            ],
        )?;

        self.store.set_uninstall_allowed(true)?;
        self.store.set_lock_state(LockState::Active)?;
        Ok(self.move_to(LockdownState::Unprotected, TransitionCause::ProtectionRemoved)?)
    }

    /// Plaintext comparison, no throttling.
    pub fn verify_pin(&self, pin: &str) -> Result<(), PinError> {
        let pin = pin.trim();
        if pin.is_empty() {
            return Err(PinError::Empty);
        }
        if pin != self.pin {
            return Err(PinError::Mismatch);
        }
        Ok(())
    }

    fn require(
        &self,
        action: &'static str,
        allowed: &[LockdownState],
    ) -> Result<(), TransitionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(TransitionError::NotAllowed {
                action,
                state: self.state,
            })
        }
    }

    fn move_to(
        &mut self,
        to: LockdownState,
        cause: TransitionCause,
    ) -> Result<Transition, StoreError> {
        let from = self.state;
        // Any exit from a break, or loss of protection, ends the window.
        if from == LockdownState::OnBreak || !to.is_protected() {
            self.store.set_break_end_time(None)?;
        }
        self.store.set_lockdown_state(to)?;
        self.state = to;

        let transition = Transition { from, to, cause };
        tracing::info!(%from, %to, %cause, "lockdown transition");
        Ok(transition)
    }
}

fn initial_state(store: &PolicyStore) -> LockdownState {
    let record = store.record();
    if !record.setup_complete {
        LockdownState::SetupPending
    } else if !record.protection_enabled {
        LockdownState::Unprotected
    } else if record.lock_state == LockState::Locked {
        LockdownState::Locked
    } else {
        LockdownState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::merge::FieldChange;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn engine_with(store: &PolicyStore) -> LockdownEngine {
        LockdownEngine::restore(store.clone(), "1133", Duration::minutes(2)).unwrap()
    }

    fn store() -> PolicyStore {
        PolicyStore::new(Arc::new(MemoryStore::new()))
    }

    /// A store in ACTIVE with setup done and protection on.
    fn active_store() -> PolicyStore {
        let s = store();
        s.set_device_id("dev-1").unwrap();
        s.set_setup_complete(true).unwrap();
        s.set_protection_enabled(true).unwrap();
        s.set_lockdown_state(LockdownState::Active).unwrap();
        s
    }

    fn locked_engine() -> (PolicyStore, LockdownEngine) {
        let s = active_store();
        s.set_lock_state(LockState::Locked).unwrap();
        let mut e = engine_with(&s);
        e.reconcile(Utc::now()).unwrap();
        assert_eq!(e.state(), LockdownState::Locked);
        (s, e)
    }

    fn protection_diff(value: bool) -> StatusDiff {
        StatusDiff {
            changes: vec![FieldChange::Protection(value)],
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_install_is_setup_pending() {
        let s = store();
        let e = engine_with(&s);
        assert_eq!(e.state(), LockdownState::SetupPending);
        assert_eq!(s.lockdown_state(), Some(LockdownState::SetupPending));
    }

    #[test]
    fn test_complete_setup_requires_privileges_and_device_id() {
        let s = store();
        let mut e = engine_with(&s);

        let err = e.complete_setup(&PrivilegeReport::default()).unwrap_err();
        assert!(matches!(err, TransitionError::MissingPrivileges(ref m) if m.len() == 4));

        let err = e.complete_setup(&PrivilegeReport::all()).unwrap_err();
        assert!(matches!(err, TransitionError::MissingDeviceId));
        assert_eq!(e.state(), LockdownState::SetupPending);

        s.set_device_id("dev-1").unwrap();
        let t = e.complete_setup(&PrivilegeReport::all()).unwrap();
        assert_eq!(t.to, LockdownState::Active);
        assert!(s.setup_complete());
        assert!(s.protection_enabled());
        assert!(!s.uninstall_allowed());
    }

    #[test]
    fn test_active_locks_when_server_freezes() {
        let s = active_store();
        let mut e = engine_with(&s);
        s.set_lock_state(LockState::Locked).unwrap();

        let transitions = e.apply_sync(&StatusDiff::default(), Utc::now()).unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].cause, TransitionCause::RemoteLock);
        assert_eq!(e.state(), LockdownState::Locked);
    }

    #[test]
    fn test_break_and_expiry_back_to_locked() {
        let (s, mut e) = locked_engine();
        let now = Utc::now();

        let (t, window) = e.grant_break("1133", now).unwrap();
        assert_eq!(t.to, LockdownState::OnBreak);
        assert_eq!(window.end_time, now + Duration::minutes(2));
        assert_eq!(s.break_end_time(), Some(now + Duration::minutes(2)));

        // Still frozen while the window is open: stays on break.
        assert!(e.reconcile(now + Duration::seconds(30)).unwrap().is_empty());
        assert_eq!(e.state(), LockdownState::OnBreak);

        let t = e.reconcile(now + Duration::minutes(3)).unwrap();
        assert_eq!(t[0].to, LockdownState::Locked);
        assert_eq!(t[0].cause, TransitionCause::BreakExpired);
        assert_eq!(s.break_end_time(), None);
    }

    #[test]
    fn test_break_expiry_unfrozen_goes_active() {
        let (s, mut e) = locked_engine();
        let now = Utc::now();
        e.grant_break("1133", now).unwrap();
        s.set_lock_state(LockState::Active).unwrap();

        e.reconcile(now + Duration::minutes(3)).unwrap();
        assert_eq!(e.state(), LockdownState::Active);
    }

    #[test]
    fn test_server_unfreeze_during_break_goes_active_immediately() {
        let (s, mut e) = locked_engine();
        let now = Utc::now();
        e.grant_break("1133", now).unwrap();
        s.set_lock_state(LockState::Active).unwrap();

        let t = e.apply_sync(&StatusDiff::default(), now).unwrap();
        assert_eq!(t[0].cause, TransitionCause::RemoteUnlock);
        assert_eq!(e.state(), LockdownState::Active);
    }

    #[test]
    fn test_break_rejected_with_wrong_pin_or_outside_locked() {
        let (_s, mut e) = locked_engine();
        assert!(matches!(
            e.grant_break("0000", Utc::now()),
            Err(TransitionError::Pin(PinError::Mismatch))
        ));
        assert!(matches!(
            e.grant_break("", Utc::now()),
            Err(TransitionError::Pin(PinError::Empty))
        ));
        assert_eq!(e.state(), LockdownState::Locked);

        let s = active_store();
        let mut e = engine_with(&s);
        assert!(matches!(
            e.grant_break("1133", Utc::now()),
            Err(TransitionError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_full_unlock_from_locked() {
        let (s, mut e) = locked_engine();
        let t = e.full_unlock("1133").unwrap();
        assert_eq!(t.from, LockdownState::Locked);
        assert_eq!(e.state(), LockdownState::Active);
        assert!(s.uninstall_allowed());
        assert!(!s.protection_enabled());
        assert!(!s.setup_complete());
        assert_eq!(s.lock_state(), LockState::Active);
    }

    #[test]
    fn test_server_disables_protection() {
        let (s, mut e) = locked_engine();
        s.set_protection_enabled(false).unwrap();
        let t = e.apply_sync(&protection_diff(false), Utc::now()).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(e.state(), LockdownState::Unprotected);
    }

    #[test]
    fn test_server_reenables_protection_and_locks_in_one_sync() {
        let s = active_store();
        let mut e = engine_with(&s);
        e.remove_protection("1133").unwrap();
        assert_eq!(e.state(), LockdownState::Unprotected);

        s.set_protection_enabled(true).unwrap();
        s.set_lock_state(LockState::Locked).unwrap();
        let t = e.apply_sync(&protection_diff(true), Utc::now()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].to, LockdownState::Active);
        assert_eq!(t[1].to, LockdownState::Locked);
    }

    #[test]
    fn test_reset_setup_only_from_unprotected() {
        let s = active_store();
        let mut e = engine_with(&s);
        assert!(e.reset_setup().is_err());
        e.remove_protection("1133").unwrap();
        let t = e.reset_setup().unwrap();
        assert_eq!(t.to, LockdownState::SetupPending);
        assert!(!s.setup_complete());
    }

    #[test]
    fn test_failed_fetch_holds_last_known_state() {
        let (_s, mut e) = locked_engine();
        assert!(e.reconcile(Utc::now()).unwrap().is_empty());
        assert_eq!(e.state(), LockdownState::Locked);
    }

    #[test]
    fn test_restore_survives_restart() {
        let (s, _e) = locked_engine();
        let e = engine_with(&s);
        assert_eq!(e.state(), LockdownState::Locked);
    }

    #[test]
    fn test_break_window_reported_while_open() {
        let (_s, mut e) = locked_engine();
        let now = Utc::now();
        assert!(e.break_window(now).is_none());
        e.grant_break("1133", now).unwrap();
        let window = e.break_window(now).unwrap();
        assert_eq!(window.remaining(now), Duration::minutes(2));
        assert!(e.break_window(now + Duration::minutes(5)).is_none());
    }
}
