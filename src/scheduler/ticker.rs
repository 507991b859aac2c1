//! Fixed-interval enforcement loop for the unpinned lock surface.
//!
//! Re-asserts the lock surface every tick until stopped. Starting an already
//! running ticker is a no-op; dropping it stops the task.

use crate::platform::UiActuator;
use crate::watcher::types::EnforcementAction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const ENFORCEMENT_INTERVAL: Duration = Duration::from_millis(100);

pub struct EnforcementTicker {
    ui: Arc<dyn UiActuator>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
    ticks: Arc<AtomicU64>,
}

impl EnforcementTicker {
    pub fn new(ui: Arc<dyn UiActuator>) -> Self {
        Self::with_interval(ui, ENFORCEMENT_INTERVAL)
    }

    pub fn with_interval(ui: Arc<dyn UiActuator>, interval: Duration) -> Self {
        Self {
            ui,
            interval,
            handle: Mutex::new(None),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start ticking. Returns false if already running. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> bool {
        let Ok(mut slot) = self.handle.lock() else {
            return false;
        };
        if slot.as_ref().map_or(false, |h| !h.is_finished()) {
            return false;
        }

        let ui = self.ui.clone();
        let ticks = self.ticks.clone();
        let period = self.interval;
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                ticks.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = ui.perform(&EnforcementAction::BringLockToFront) {
                    tracing::debug!(error = %e, "lock surface re-assert failed");
                }
            }
        }));
        tracing::debug!("enforcement ticker started");
        true
    }

    /// Stop ticking. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let Ok(mut slot) = self.handle.lock() else {
            return false;
        };
        match slot.take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!("enforcement ticker stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|slot| slot.as_ref().map_or(false, |h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Ticks fired since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Drop for EnforcementTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
