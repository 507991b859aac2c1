//! Keyed background job scheduler on the tokio runtime.
//!
//! Each key owns at most one live schedule. Periodic jobs retry a failed run
//! with backoff until the next period is due; one-shot jobs retry up to their
//! policy's attempt bound. Dropping the scheduler cancels everything.
//!
//! Cancelling a key aborts a schedule that is waiting for its next run. A
//! run already in progress is never interrupted: it completes and the
//! schedule then ends without retrying. Jobs may therefore cancel their own
//! key, which the agent does whenever a run changes the lockdown state.

use crate::scheduler::job::{ExistingJobPolicy, Job, JobOutcome, RetryPolicy};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Shared between a schedule's task and its slot in the scheduler.
#[derive(Default)]
struct RunState {
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl RunState {
    /// Mark a run as started. False when the schedule was cancelled.
    fn begin(&self) -> bool {
        self.running.store(true, Ordering::SeqCst);
        if self.cancelled.load(Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Mark a run as finished. False when the schedule was cancelled meanwhile.
    fn end(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        !self.cancelled.load(Ordering::SeqCst)
    }
}

struct Slot {
    handle: JoinHandle<()>,
    state: Arc<RunState>,
}

impl Slot {
    fn is_live(&self) -> bool {
        !self.handle.is_finished() && !self.state.cancelled.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        if !self.state.running.load(Ordering::SeqCst) {
            self.handle.abort();
        }
    }
}

#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, Slot>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `job` every `every`, first run one period from now. Returns false
    /// when `policy` is `Keep` and a live schedule already holds `key`.
    pub fn enqueue_periodic(
        &self,
        key: &str,
        every: Duration,
        policy: ExistingJobPolicy,
        job: Arc<dyn Job>,
    ) -> bool {
        let name = key.to_string();
        self.install(key, policy, move |state| {
            tokio::spawn(run_periodic(
                name,
                every,
                RetryPolicy::unbounded(),
                job,
                state,
            ))
        })
    }

    /// Run `job` once after `delay`, retrying per `retry`. A pending one-shot
    /// under the same key is replaced.
    pub fn enqueue_once(
        &self,
        key: &str,
        delay: Duration,
        retry: RetryPolicy,
        job: Arc<dyn Job>,
    ) -> bool {
        let name = key.to_string();
        self.install(key, ExistingJobPolicy::Replace, move |state| {
            tokio::spawn(run_once(name, delay, retry, job, state))
        })
    }

    /// Returns whether a live schedule was cancelled.
    pub fn cancel(&self, key: &str) -> bool {
        let Ok(mut jobs) = self.jobs.lock() else {
            return false;
        };
        match jobs.remove(key) {
            Some(slot) => {
                let live = slot.is_live();
                slot.stop();
                live
            }
            None => false,
        }
    }

    /// Whether a schedule under `key` is still live.
    pub fn is_scheduled(&self, key: &str) -> bool {
        self.jobs
            .lock()
            .map(|jobs| jobs.get(key).map_or(false, Slot::is_live))
            .unwrap_or(false)
    }

    pub fn scheduled_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .jobs
            .lock()
            .map(|jobs| {
                jobs.iter()
                    .filter(|(_, slot)| slot.is_live())
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn shutdown(&self) {
        if let Ok(mut jobs) = self.jobs.lock() {
            for (_, slot) in jobs.drain() {
                slot.stop();
            }
        }
    }

    fn install(
        &self,
        key: &str,
        policy: ExistingJobPolicy,
        spawn: impl FnOnce(Arc<RunState>) -> JoinHandle<()>,
    ) -> bool {
        let Ok(mut jobs) = self.jobs.lock() else {
            tracing::warn!(key, "scheduler lock poisoned, job not scheduled");
            return false;
        };
        if let Some(existing) = jobs.get(key) {
            if existing.is_live() {
                match policy {
                    ExistingJobPolicy::Keep => {
                        tracing::debug!(key, "job already scheduled, keeping existing");
                        return false;
                    }
                    ExistingJobPolicy::Replace => existing.stop(),
                }
            }
        }
        let state = Arc::new(RunState::default());
        let handle = spawn(state.clone());
        jobs.insert(key.to_string(), Slot { handle, state });
        tracing::debug!(key, "job scheduled");
        true
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One run of `job`, or `None` once the schedule has been cancelled.
async fn run_guarded(job: &dyn Job, state: &RunState) -> Option<JobOutcome> {
    if !state.begin() {
        return None;
    }
    let outcome = job.run().await;
    state.end().then_some(outcome)
}

async fn run_periodic(
    key: String,
    every: Duration,
    retry: RetryPolicy,
    job: Arc<dyn Job>,
    state: Arc<RunState>,
) {
    let mut next = Instant::now() + every;
    loop {
        tokio::time::sleep_until(next).await;
        next += every;

        let mut retries = 0;
        loop {
            match run_guarded(&*job, &state).await {
                None => return,
                Some(JobOutcome::Success) => break,
                Some(JobOutcome::Retry) => {}
            }
            let at = Instant::now() + retry.delay_for(retries);
            if at >= next {
                tracing::debug!(key = %key, "retries deferred to next period");
                break;
            }
            retries += 1;
            tokio::time::sleep_until(at).await;
        }

        let now = Instant::now();
        if next <= now {
            next = now + every;
        }
    }
}

async fn run_once(
    key: String,
    delay: Duration,
    retry: RetryPolicy,
    job: Arc<dyn Job>,
    state: Arc<RunState>,
) {
    tokio::time::sleep(delay).await;
    let mut attempts = 0;
    loop {
        attempts += 1;
        match run_guarded(&*job, &state).await {
            None => {
                tracing::debug!(key = %key, "one-shot job cancelled during its run");
                return;
            }
            Some(JobOutcome::Success) => return,
            Some(JobOutcome::Retry) => {}
        }
        if !retry.allows_another(attempts) {
            tracing::warn!(key = %key, attempts, "one-shot job gave up");
            return;
        }
        tokio::time::sleep(retry.delay_for(attempts - 1)).await;
    }
}
