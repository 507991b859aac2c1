pub mod job;
#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod ticker;

pub use job::{
    job_fn, ExistingJobPolicy, FnJob, Job, JobOutcome, RetryPolicy, BREAK_EXPIRY,
    STATUS_CHECK_NOW, STATUS_CHECK_PERIODIC,
};
pub use scheduler::Scheduler;
pub use ticker::{EnforcementTicker, ENFORCEMENT_INTERVAL};
