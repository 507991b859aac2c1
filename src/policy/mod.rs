pub mod engine;
pub mod types;

pub use engine::{LockdownEngine, PinError, Transition, TransitionCause, TransitionError};
pub use types::*;
