//! Job trait and scheduling policies.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Stable job keys used by the agent.
pub const STATUS_CHECK_PERIODIC: &str = "status-check-periodic";
pub const STATUS_CHECK_NOW: &str = "status-check-now";
pub const BREAK_EXPIRY: &str = "break-expiry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Transient failure; run again after the retry backoff.
    Retry,
}

#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> JobOutcome;
}

/// Adapter turning an async closure into a `Job`.
pub struct FnJob<F>(F);

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = JobOutcome> + Send,
{
    async fn run(&self) -> JobOutcome {
        (self.0)().await
    }
}

pub fn job_fn<F, Fut>(f: F) -> Arc<dyn Job>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = JobOutcome> + Send + 'static,
{
    Arc::new(FnJob(f))
}

/// What to do when a job with the same key is already scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingJobPolicy {
    /// Leave the running schedule alone and drop the new request.
    Keep,
    /// Cancel the running schedule and start the new one.
    Replace,
}

/// Exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Total attempts including the first; `None` retries until the
    /// schedule itself moves on.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(5 * 60 * 60),
            max_attempts: Some(5),
        }
    }
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based): initial * 2^retry,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` have run.
    pub fn allows_another(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}
