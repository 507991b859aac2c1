//! The tamper watcher as a running component.
//!
//! A platform event bridge delivers foreground changes; `TamperWatcher`
//! reads the current policy facts from the store, asks `evaluate_event`
//! what to do and performs the actions through the `UiActuator`. The
//! watcher lives in its own process, so it re-reads the store before every
//! event.

use crate::audit::{Journal, JournalEntry};
use crate::platform::UiActuator;
use crate::policy::types::LockdownState;
use crate::store::PolicyStore;
use crate::watcher::rules::{evaluate_event, WatcherRules};
use crate::watcher::types::{ForegroundEvent, WatcherContext, WatcherDecision};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Subscription interface fed by the platform's foreground-change events.
pub trait ForegroundListener: Send + Sync {
    fn on_foreground_changed(&self, event: &ForegroundEvent) -> WatcherDecision;
}

pub struct TamperWatcher {
    rules: WatcherRules,
    store: PolicyStore,
    ui: Arc<dyn UiActuator>,
    journal: Option<Arc<Journal>>,
}

impl TamperWatcher {
    pub fn new(rules: WatcherRules, store: PolicyStore, ui: Arc<dyn UiActuator>) -> Self {
        Self {
            rules,
            store,
            ui,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Policy facts as currently persisted.
    pub fn context(&self, now: DateTime<Utc>) -> WatcherContext {
        if let Err(e) = self.store.refresh() {
            // Keep enforcing on the last values we could read.
            tracing::warn!(error = %e, "could not refresh policy store");
        }
        let record = self.store.record();
        let state = self.store.lockdown_state();

        WatcherContext {
            protection_enabled: record.protection_enabled
                && state.map_or(false, |s| s.is_protected()),
            enforcing_lock: state == Some(LockdownState::Locked) && !record.break_active(now),
        }
    }

    /// Evaluate one event at `now` and perform the resulting actions.
    pub fn handle(&self, event: &ForegroundEvent, now: DateTime<Utc>) -> WatcherDecision {
        let ctx = self.context(now);
        let decision = evaluate_event(event, &ctx, &self.rules);

        if decision.is_empty() {
            tracing::debug!(package = %event.package, "foreground change ignored");
            return decision;
        }

        tracing::info!(
            package = %event.package,
            actions = decision.actions.len(),
            "intervening on foreground change"
        );
        for action in &decision.actions {
            // Duplicate or failed actions are tolerated; the next event
            // re-asserts.
            if let Err(e) = self.ui.perform(action) {
                tracing::warn!(%action, error = %e, "enforcement action failed");
            }
        }
        if let Some(ref journal) = self.journal {
            journal.record_quietly(&JournalEntry::tamper("watcher", &decision));
        }
        decision
    }
}

impl ForegroundListener for TamperWatcher {
    fn on_foreground_changed(&self, event: &ForegroundEvent) -> WatcherDecision {
        self.handle(event, Utc::now())
    }
}

/// Counters from one run of `pump_events`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub events: usize,
    pub interventions: usize,
    pub malformed: usize,
}

/// Feed newline-delimited JSON events from `input` to `listener` and write
/// one JSON decision line per event to `output`. Returns at end of input.
pub async fn pump_events<R, W>(
    listener: &dyn ForegroundListener,
    input: R,
    mut output: W,
) -> Result<PumpStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = PumpStats::default();
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await.context("Failed to read event stream")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: ForegroundEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed event");
                stats.malformed += 1;
                continue;
            }
        };

        stats.events += 1;
        let decision = listener.on_foreground_changed(&event);
        if !decision.is_empty() {
            stats.interventions += 1;
        }

        let mut json = serde_json::to_string(&decision).context("Failed to serialize decision")?;
        json.push('\n');
        output
            .write_all(json.as_bytes())
            .await
            .context("Failed to write decision")?;
        output.flush().await.context("Failed to flush decisions")?;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::AgentConfig;
    use crate::platform::SimulatedPlatform;
    use crate::policy::types::LockState;
    use crate::store::MemoryStore;
    use crate::watcher::types::EnforcementAction;
    use chrono::Duration;

    fn setup(state: LockdownState) -> (Arc<SimulatedPlatform>, PolicyStore, TamperWatcher) {
        let sim = Arc::new(SimulatedPlatform::new());
        let store = PolicyStore::new(Arc::new(MemoryStore::new()));
        store.set_protection_enabled(true).unwrap();
        store.set_lockdown_state(state).unwrap();
        if state == LockdownState::Locked {
            store.set_lock_state(LockState::Locked).unwrap();
        }
        let rules = WatcherRules::from_config(&AgentConfig::default()).unwrap();
        let watcher = TamperWatcher::new(rules, store.clone(), sim.clone());
        (sim, store, watcher)
    }

    #[test]
    fn test_context_follows_store() {
        let (_sim, store, watcher) = setup(LockdownState::Locked);
        let now = Utc::now();
        assert!(watcher.context(now).enforcing_lock);

        store.set_break_end_time(Some(now + Duration::minutes(2))).unwrap();
        let ctx = watcher.context(now);
        assert!(!ctx.enforcing_lock);
        assert!(ctx.protection_enabled);

        store.set_lockdown_state(LockdownState::Unprotected).unwrap();
        assert!(!watcher.context(now).protection_enabled);
    }

    #[test]
    fn test_handle_performs_actions() {
        let (sim, _store, watcher) = setup(LockdownState::Locked);
        let decision = watcher.handle(&ForegroundEvent::new("com.example.game"), Utc::now());
        assert!(!decision.is_empty());
        assert_eq!(sim.ui_actions(), vec![EnforcementAction::BringLockToFront]);
    }

    #[test]
    fn test_failed_action_does_not_stop_the_rest() {
        let sim = Arc::new(SimulatedPlatform::new().failing("ui"));
        let store = PolicyStore::new(Arc::new(MemoryStore::new()));
        store.set_protection_enabled(true).unwrap();
        store.set_lockdown_state(LockdownState::Active).unwrap();
        let rules = WatcherRules::from_config(&AgentConfig::default()).unwrap();
        let watcher = TamperWatcher::new(rules, store, sim.clone());

        let event = ForegroundEvent::new("com.android.settings").with_text("Force stop");
        let decision = watcher.handle(&event, Utc::now());
        assert_eq!(decision.actions.len(), 3);
        // Every action was attempted even though each one failed.
        assert_eq!(sim.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_pump_reads_lines_and_writes_decisions() {
        let (sim, _store, watcher) = setup(LockdownState::Locked);
        let input = concat!(
            "{\"package\": \"com.example.game\"}\n",
            "\n",
            "not json\n",
            "{\"package\": \"com.android.dialer\"}\n",
        );
        let mut output = Vec::new();

        let stats = pump_events(&watcher, input.as_bytes(), &mut output)
            .await
            .unwrap();
        assert_eq!(
            stats,
            PumpStats {
                events: 2,
                interventions: 1,
                malformed: 1
            }
        );

        let text = String::from_utf8(output).unwrap();
        let decisions: Vec<WatcherDecision> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(decisions.len(), 2);
        assert!(decisions[1].is_empty());
        assert_eq!(sim.ui_actions().len(), 1);
    }
}
