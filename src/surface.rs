//! Lock surface lifecycle and the local unlock signal.
//!
//! The surface is what the user sees while LOCKED: the server's message,
//! the number to call and the amount due. When the kiosk could not pin it,
//! an `EnforcementTicker` keeps pulling it back to the foreground. The ticker
//! only runs while the surface is shown in degraded mode; a break, pinning,
//! an unlock or teardown stops it.

use crate::kiosk::KioskMode;
use crate::platform::UiActuator;
use crate::policy::types::DeviceRecord;
use crate::scheduler::EnforcementTicker;
use crate::watcher::types::EnforcementAction;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Broadcast raised whenever the device leaves the lock by any path.
/// Carries a generation counter so late subscribers can tell whether an
/// unlock happened since they last looked.
#[derive(Clone)]
pub struct UnlockSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for UnlockSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl UnlockSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn raise(&self) {
        self.tx.send_modify(|generation| *generation += 1);
        tracing::debug!(generation = self.generation(), "unlock signal raised");
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

/// What the lock surface displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockNotice {
    pub message: Option<String>,
    pub call_to: Option<String>,
    pub due_amount: i64,
}

impl LockNotice {
    pub fn from_record(record: &DeviceRecord) -> Self {
        Self {
            message: record.message.clone(),
            call_to: record.call_to.clone(),
            due_amount: record.due_amount,
        }
    }
}

pub struct LockSurface {
    ui: Arc<dyn UiActuator>,
    ticker: EnforcementTicker,
    visible: AtomicBool,
}

impl LockSurface {
    pub fn new(ui: Arc<dyn UiActuator>) -> Self {
        Self {
            ticker: EnforcementTicker::new(ui.clone()),
            ui,
            visible: AtomicBool::new(false),
        }
    }

    pub fn with_interval(ui: Arc<dyn UiActuator>, interval: Duration) -> Self {
        Self {
            ticker: EnforcementTicker::with_interval(ui.clone(), interval),
            ui,
            visible: AtomicBool::new(false),
        }
    }

    /// Bring the surface up for a lock held in `mode`.
    pub fn show(&self, mode: KioskMode) {
        self.visible.store(true, Ordering::SeqCst);
        if let Err(e) = self.ui.perform(&EnforcementAction::BringLockToFront) {
            tracing::warn!(error = %e, "could not bring lock surface to front");
        }
        match mode {
            KioskMode::Degraded => {
                self.ticker.start();
            }
            KioskMode::Pinned => {
                self.ticker.stop();
            }
        }
    }

    /// Break granted: the surface steps aside until the window closes.
    pub fn suspend_for_break(&self) {
        self.ticker.stop();
        self.visible.store(false, Ordering::SeqCst);
    }

    pub fn dismiss(&self) {
        let was_visible = self.visible.swap(false, Ordering::SeqCst);
        self.ticker.stop();
        if was_visible {
            tracing::info!("lock surface dismissed");
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Whether the foreground re-assert loop is running.
    pub fn is_enforcing(&self) -> bool {
        self.ticker.is_running()
    }

    /// Dismiss the surface every time `signal` is raised. The task ends when
    /// the signal's sender is dropped.
    pub fn close_on_unlock(self: &Arc<Self>, signal: &UnlockSignal) -> JoinHandle<()> {
        let surface = Arc::clone(self);
        let mut rx = signal.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                surface.dismiss();
            }
        })
    }
}

impl Drop for LockSurface {
    fn drop(&mut self) {
        self.ticker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedPlatform;

    fn surface(sim: &Arc<SimulatedPlatform>) -> Arc<LockSurface> {
        Arc::new(LockSurface::with_interval(
            sim.clone(),
            Duration::from_millis(10),
        ))
    }

    #[tokio::test]
    async fn test_degraded_lock_runs_ticker() {
        let sim = Arc::new(SimulatedPlatform::unprivileged());
        let s = surface(&sim);
        s.show(KioskMode::Degraded);
        assert!(s.is_visible());
        assert!(s.is_enforcing());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sim.ui_actions().len() >= 2);

        s.suspend_for_break();
        assert!(!s.is_enforcing());
        assert!(!s.is_visible());
    }

    #[tokio::test]
    async fn test_pinned_lock_has_no_ticker() {
        let sim = Arc::new(SimulatedPlatform::new());
        let s = surface(&sim);
        s.show(KioskMode::Degraded);
        s.show(KioskMode::Pinned);
        assert!(s.is_visible());
        assert!(!s.is_enforcing());
    }

    #[tokio::test]
    async fn test_unlock_signal_closes_surface() {
        let sim = Arc::new(SimulatedPlatform::unprivileged());
        let s = surface(&sim);
        let signal = UnlockSignal::new();
        let listener = s.close_on_unlock(&signal);

        s.show(KioskMode::Degraded);
        signal.raise();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!s.is_visible());
        assert!(!s.is_enforcing());
        assert_eq!(signal.generation(), 1);
        listener.abort();
    }

    #[test]
    fn test_unlock_signal_counts_generations() {
        let signal = UnlockSignal::new();
        let rx = signal.subscribe();
        signal.raise();
        signal.raise();
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(signal.clone().generation(), 2);
    }

    #[test]
    fn test_notice_from_record() {
        let record = DeviceRecord {
            message: Some("Payment overdue".to_string()),
            call_to: Some("+15550100".to_string()),
            due_amount: 1200,
            ..Default::default()
        };
        let notice = LockNotice::from_record(&record);
        assert_eq!(notice.message.as_deref(), Some("Payment overdue"));
        assert_eq!(notice.due_amount, 1200);
    }
}
