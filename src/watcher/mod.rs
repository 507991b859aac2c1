pub mod rules;
pub mod types;
#[allow(clippy::module_inception)]
pub mod watcher;

pub use rules::{evaluate_event, WatcherRules};
pub use types::*;
pub use watcher::{pump_events, ForegroundListener, PumpStats, TamperWatcher};
