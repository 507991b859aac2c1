//! Composition root: one agent per install.
//!
//! Wires the policy store, status client, lockdown engine, kiosk, icon,
//! command executor, lock surface and scheduler together, and owns the
//! sync cycle:
//!
//! 1. fetch the server status (a failure reconciles on stored values and is
//!    reported so the scheduler can retry);
//! 2. a forced-uninstall directive short-circuits everything else;
//! 3. otherwise merge, let the engine move, apply the effects of every
//!    transition, toggle the icon and run any update directive.
//!
//! The CLI and the daemon run as separate processes over the same state
//! file. Before acting, the agent adopts any state another process wrote.

use crate::audit::{EntryKind, Journal, JournalEntry, Outcome};
use crate::command::{
    Downloader, HttpDownloader, RemoteCommandExecutor, UninstallOutcome, UpdateOutcome,
};
use crate::config::types::{AgentConfig, PlatformKind};
use crate::icon::IconController;
use crate::kiosk::KioskController;
use crate::platform::{Platform, ShellPlatform, SimulatedPlatform};
use crate::policy::types::{BreakWindow, DeviceRecord, LockdownState};
use crate::policy::{LockdownEngine, Transition, TransitionError};
use crate::remote::merge::{FieldChange, StatusDiff};
use crate::remote::{merge_status, HttpStatusClient, RemoteError, StatusSource};
use crate::scheduler::{
    job_fn, ExistingJobPolicy, Job, JobOutcome, RetryPolicy, Scheduler, BREAK_EXPIRY,
    STATUS_CHECK_NOW, STATUS_CHECK_PERIODIC,
};
use crate::store::{FileStore, KeyValueStore, PolicyStore, StoreError};
use crate::surface::{LockSurface, UnlockSignal};
use crate::utils::paths;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use thiserror::Error;

/// Journal source label for the long-running daemon.
pub const SOURCE_AGENT: &str = "agent";
/// Journal source label for one-shot CLI invocations.
pub const SOURCE_CLI: &str = "cli";

/// Slack added to the break-expiry recheck so it lands after the window.
const BREAK_EXPIRY_SLACK: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("status check failed: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one sync cycle did.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncReport {
    /// No device id saved yet; nothing to ask the server about.
    NoDeviceId,
    /// The server directed self-removal; nothing else was processed.
    Uninstall { outcome: UninstallOutcome },
    Applied {
        diff: StatusDiff,
        transitions: Vec<Transition>,
        update: Option<UpdateOutcome>,
    },
}

/// Everything the agent is built from. Tests substitute the source, the
/// backend and the downloader.
pub struct AgentParts {
    pub config: AgentConfig,
    pub kv: Arc<dyn KeyValueStore>,
    pub source: Arc<dyn StatusSource>,
    pub platform: Platform,
    pub downloader: Arc<dyn Downloader>,
    pub downloads_dir: PathBuf,
    pub journal: Option<Arc<Journal>>,
    pub label: &'static str,
}

pub struct Agent {
    me: Weak<Agent>,
    config: AgentConfig,
    store: PolicyStore,
    engine: Mutex<LockdownEngine>,
    source: Arc<dyn StatusSource>,
    platform: Platform,
    kiosk: Arc<KioskController>,
    icon: IconController,
    executor: RemoteCommandExecutor,
    surface: Arc<LockSurface>,
    unlock: UnlockSignal,
    scheduler: Scheduler,
    journal: Option<Arc<Journal>>,
    label: &'static str,
    cycle: tokio::sync::Mutex<()>,
}

impl Agent {
    pub fn new(parts: AgentParts) -> Result<Arc<Self>, StoreError> {
        let AgentParts {
            config,
            kv,
            source,
            platform,
            downloader,
            downloads_dir,
            journal,
            label,
        } = parts;

        let store = PolicyStore::new(kv);
        if store.installed_version() < config.installed_version {
            store.set_installed_version(config.installed_version)?;
        }
        let engine = LockdownEngine::restore(
            store.clone(),
            config.pin.clone(),
            chrono::Duration::minutes(config.break_minutes),
        )?;

        let kiosk = Arc::new(KioskController::new(
            platform.device_owner.clone(),
            config.kiosk.restriction_retention,
        ));
        let executor = RemoteCommandExecutor::new(
            platform.packages.clone(),
            kiosk.clone(),
            store.clone(),
            downloader,
            downloads_dir,
            config.own_package.clone(),
        );

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            icon: IconController::new(platform.launcher.clone()),
            surface: Arc::new(LockSurface::new(platform.ui.clone())),
            unlock: UnlockSignal::new(),
            scheduler: Scheduler::new(),
            engine: Mutex::new(engine),
            cycle: tokio::sync::Mutex::new(()),
            config,
            store,
            source,
            platform,
            kiosk,
            executor,
            journal,
            label,
        }))
    }

    /// Compose the production agent for `state_dir`.
    pub fn from_config(
        config: AgentConfig,
        state_dir: &Path,
        label: &'static str,
    ) -> anyhow::Result<Arc<Self>> {
        let platform = build_platform(&config);
        let timeout = Duration::from_secs(config.server.timeout_secs);

        let kv = FileStore::open(paths::store_path(state_dir))
            .context("Failed to open the policy store")?;
        let source = HttpStatusClient::new(config.server.status_url.clone(), timeout)
            .context("Failed to build the status client")?;
        let downloader =
            HttpDownloader::new(timeout).context("Failed to build the update downloader")?;
        let journal = Journal::open(paths::journal_path(state_dir))
            .context("Failed to open the enforcement journal")?;

        let agent = Self::new(AgentParts {
            config,
            kv: Arc::new(kv),
            source: Arc::new(source),
            platform,
            downloader: Arc::new(downloader),
            downloads_dir: paths::downloads_dir(state_dir),
            journal: Some(Arc::new(journal)),
            label,
        })?;
        Ok(agent)
    }

    // ── Accessors ──

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub fn record(&self) -> DeviceRecord {
        self.store.record()
    }

    pub fn state(&self) -> LockdownState {
        self.engine()
            .map(|engine| engine.state())
            .unwrap_or(LockdownState::SetupPending)
    }

    pub fn break_window(&self, now: DateTime<Utc>) -> Option<BreakWindow> {
        self.engine().ok()?.break_window(now)
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn surface(&self) -> &Arc<LockSurface> {
        &self.surface
    }

    pub fn unlock_signal(&self) -> &UnlockSignal {
        &self.unlock
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn engine(&self) -> Result<MutexGuard<'_, LockdownEngine>, StoreError> {
        self.engine.lock().map_err(|_| StoreError::Poisoned)
    }

    // ── Boot & background work ──

    /// Boot recovery: reconcile the persisted state against the clock (an
    /// expired break ends here) and re-apply its effects.
    pub fn boot(&self, now: DateTime<Utc>) -> Result<Vec<Transition>, StoreError> {
        self.store.refresh()?;
        let transitions = self.engine()?.reconcile(now)?;
        if transitions.is_empty() {
            self.enter(None, self.state(), now);
        } else {
            self.apply_transitions(&transitions, now);
        }
        self.icon.apply(self.store.hide_icon());
        tracing::info!(state = %self.state(), "boot recovery complete");
        Ok(transitions)
    }

    /// Enqueue an immediate status check and the periodic one. The periodic
    /// schedule keeps an existing one, so calling this twice is harmless.
    pub fn schedule_background(&self) {
        self.request_check();
        let every = Duration::from_secs(self.config.poll_interval_minutes.saturating_mul(60));
        self.scheduler.enqueue_periodic(
            STATUS_CHECK_PERIODIC,
            every,
            ExistingJobPolicy::Keep,
            self.status_job(),
        );
    }

    /// One-shot check as soon as possible (boot, app brought to front).
    pub fn request_check(&self) {
        self.scheduler.enqueue_once(
            STATUS_CHECK_NOW,
            Duration::ZERO,
            RetryPolicy::default(),
            self.status_job(),
        );
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        self.surface.dismiss();
    }

    fn status_job(&self) -> Arc<dyn Job> {
        let me = self.me.clone();
        job_fn(move || {
            let me = me.clone();
            async move {
                let Some(agent) = me.upgrade() else {
                    return JobOutcome::Success;
                };
                match agent.sync_once(Utc::now()).await {
                    Ok(_) => JobOutcome::Success,
                    Err(e) => {
                        tracing::debug!(error = %e, "scheduled status check will retry");
                        JobOutcome::Retry
                    }
                }
            }
        })
    }

    fn schedule_break_expiry(&self, now: DateTime<Utc>) {
        let Some(window) = self.break_window(now) else {
            return;
        };
        let delay = window.remaining(now).to_std().unwrap_or_default() + BREAK_EXPIRY_SLACK;
        self.scheduler.enqueue_once(
            BREAK_EXPIRY,
            delay,
            RetryPolicy::default(),
            self.status_job(),
        );
        tracing::info!(until = %window.end_time, "break expiry recheck scheduled");
    }

    /// Adopt a state another process persisted (a PIN action from the CLI)
    /// and enforce it. Returns the `(from, to)` pair when something changed.
    pub fn follow_local_changes(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<(LockdownState, LockdownState)>, StoreError> {
        self.store.refresh()?;
        let (from, to) = {
            let mut engine = self.engine()?;
            if self.store.lockdown_state() == Some(engine.state()) {
                return Ok(None);
            }
            let from = engine.state();
            let break_length = engine.break_length();
            *engine =
                LockdownEngine::restore(self.store.clone(), self.config.pin.clone(), break_length)?;
            (from, engine.state())
        };
        if from == to {
            return Ok(None);
        }
        tracing::info!(%from, %to, "adopted state written by another process");
        self.enter(Some(from), to, now);
        Ok(Some((from, to)))
    }

    // ── Sync cycle ──

    pub async fn sync_once(&self, now: DateTime<Utc>) -> Result<SyncReport, SyncError> {
        let _cycle = self.cycle.lock().await;
        self.follow_local_changes(now)?;

        let Some(device_id) = self.store.device_id() else {
            tracing::debug!("no device id saved, skipping status check");
            return Ok(SyncReport::NoDeviceId);
        };

        let fetched = match self.source.fetch_status(&device_id).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(error = %e, "status check failed, holding last known state");
                self.record_entry(JournalEntry::new(
                    EntryKind::Sync,
                    self.label,
                    format!("status check failed: {}", e),
                    Outcome::Failed,
                ));
                let transitions = self.engine()?.reconcile(now)?;
                self.apply_transitions(&transitions, now);
                return Err(e.into());
            }
        };

        if fetched.status.wants_uninstall() {
            return Ok(SyncReport::Uninstall {
                outcome: self.run_forced_uninstall(now)?,
            });
        }

        let diff = merge_status(&self.store, &fetched, now)?;
        let transitions = self.engine()?.apply_sync(&diff, now)?;
        self.apply_transitions(&transitions, now);

        for change in &diff.changes {
            if let FieldChange::HideIcon(hide) = change {
                self.icon.apply(*hide);
            }
        }

        let update = match &diff.directives.update {
            Some(directive) => {
                let outcome = self.executor.update(directive).await;
                self.journal_update(&outcome);
                Some(outcome)
            }
            None => None,
        };

        self.record_entry(
            JournalEntry::new(
                EntryKind::Sync,
                self.label,
                format!("status applied, {} field(s) changed", diff.changes.len()),
                Outcome::Ok,
            )
            .with_detail(&diff),
        );

        Ok(SyncReport::Applied {
            diff,
            transitions,
            update,
        })
    }

    fn run_forced_uninstall(&self, now: DateTime<Utc>) -> Result<UninstallOutcome, StoreError> {
        let outcome = self.executor.force_uninstall();
        let (summary, result) = match &outcome {
            UninstallOutcome::Silent => ("forced uninstall: removed silently".to_string(), Outcome::Ok),
            UninstallOutcome::Requested => {
                ("forced uninstall: removal requested from user".to_string(), Outcome::Ok)
            }
            UninstallOutcome::Failed { reason } => {
                (format!("forced uninstall failed: {}", reason), Outcome::Failed)
            }
        };
        self.record_entry(
            JournalEntry::new(EntryKind::Command, self.label, summary, result).with_detail(&outcome),
        );

        if outcome.succeeded() {
            // The record is gone; start over from a fresh install's state.
            self.scheduler.cancel(BREAK_EXPIRY);
            self.follow_local_changes(now)?;
        } else {
            // Removal released the restrictions; put the current state's back.
            self.enter(None, self.state(), now);
        }
        Ok(outcome)
    }

    fn journal_update(&self, outcome: &UpdateOutcome) {
        let (summary, result) = match outcome {
            UpdateOutcome::NotNewer { .. } => return,
            UpdateOutcome::Installed { version } => {
                (format!("update installed: version {}", version), Outcome::Ok)
            }
            UpdateOutcome::Unsupported => (
                "update offered but silent install is unavailable".to_string(),
                Outcome::Failed,
            ),
            UpdateOutcome::Failed { reason } => (format!("update failed: {}", reason), Outcome::Failed),
        };
        self.record_entry(
            JournalEntry::new(EntryKind::Command, self.label, summary, result).with_detail(outcome),
        );
    }

    // ── Local actions ──

    /// Save the identifier the server knows this device by.
    pub fn save_device_id(&self, device_id: &str) -> Result<(), StoreError> {
        self.store.set_device_id(device_id.trim())
    }

    /// Confirm setup with whatever privileges the platform reports.
    pub fn complete_setup(&self, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
        self.follow_local_changes(now)?;
        let privileges = self.platform.privileges.privileges();
        let transition = self.engine()?.complete_setup(&privileges)?;
        self.apply_transitions(&[transition], now);
        Ok(transition)
    }

    pub fn reset_setup(&self, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
        self.follow_local_changes(now)?;
        let transition = self.engine()?.reset_setup()?;
        self.apply_transitions(&[transition], now);
        Ok(transition)
    }

    pub fn full_unlock(&self, pin: &str, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
        self.pin_action("full unlock", now, |engine| engine.full_unlock(pin), |t| *t)
    }

    pub fn grant_break(
        &self,
        pin: &str,
        now: DateTime<Utc>,
    ) -> Result<(Transition, BreakWindow), TransitionError> {
        self.pin_action("break", now, |engine| engine.grant_break(pin, now), |(t, _)| *t)
    }

    pub fn remove_protection(
        &self,
        pin: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        self.pin_action(
            "remove protection",
            now,
            |engine| engine.remove_protection(pin),
            |t| *t,
        )
    }

    fn pin_action<T>(
        &self,
        action: &str,
        now: DateTime<Utc>,
        run: impl FnOnce(&mut LockdownEngine) -> Result<T, TransitionError>,
        transition_of: impl Fn(&T) -> Transition,
    ) -> Result<T, TransitionError> {
        self.follow_local_changes(now)?;
        let result = {
            let mut engine = self.engine()?;
            run(&mut *engine)
        };
        self.record_entry(JournalEntry::pin(
            self.label,
            action,
            result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
        ));
        let value = result?;
        self.apply_transitions(&[transition_of(&value)], now);
        Ok(value)
    }

    // ── Effects ──

    fn apply_transitions(&self, transitions: &[Transition], now: DateTime<Utc>) {
        for transition in transitions {
            self.record_entry(JournalEntry::transition(self.label, transition));
            self.enter(Some(transition.from), transition.to, now);
        }
    }

    /// Make the device match `to`. `from` is `None` when re-enforcing the
    /// current state (boot, failed removal).
    fn enter(&self, from: Option<LockdownState>, to: LockdownState, now: DateTime<Utc>) {
        use LockdownState::*;

        let leaving_lock = matches!(from, Some(Locked) | Some(OnBreak));
        match to {
            Locked => {
                self.scheduler.cancel(BREAK_EXPIRY);
                let mode = self.kiosk.engage();
                self.surface.show(mode);
            }
            OnBreak => {
                self.kiosk.disengage(true);
                self.surface.suspend_for_break();
                self.schedule_break_expiry(now);
            }
            Active => {
                self.scheduler.cancel(BREAK_EXPIRY);
                self.surface.dismiss();
                let protected = self.store.protection_enabled();
                if leaving_lock || !protected {
                    self.kiosk.disengage(protected);
                }
                if protected {
                    self.kiosk.protect();
                }
            }
            Unprotected => {
                self.scheduler.cancel(BREAK_EXPIRY);
                self.surface.dismiss();
                self.kiosk.disengage(false);
            }
            SetupPending => {
                self.scheduler.cancel(BREAK_EXPIRY);
                self.surface.dismiss();
            }
        }

        if leaving_lock && !to.enforces_lock() && to != OnBreak {
            self.unlock.raise();
        }
    }

    fn record_entry(&self, entry: JournalEntry) {
        if let Some(journal) = &self.journal {
            journal.record_quietly(&entry);
        }
    }
}

/// Pick the backend named in the configuration.
pub fn build_platform(config: &AgentConfig) -> Platform {
    match config.platform.kind {
        PlatformKind::Shell => Platform::from_backend(Arc::new(ShellPlatform::new(
            config.own_package.clone(),
            &config.platform,
        ))),
        PlatformKind::Simulated => Platform::from_backend(Arc::new(
            SimulatedPlatform::new().with_device_owner(config.platform.device_owner),
        )),
    }
}
