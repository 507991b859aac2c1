//! Persisted key names and their owners.
//!
//! Each key has exactly one primary writer. Sync-owned keys are only written
//! by the remote status merge; locally owned keys are only written by setup,
//! PIN actions and the lockdown engine. This is what lets the store get away
//! without cross-key transactions.

pub const DEVICE_ID: &str = "device_id";
pub const SETUP_COMPLETE: &str = "setup_complete";
pub const PROTECTION_ENABLED: &str = "protection_enabled";
pub const LOCK_STATE: &str = "lock_state";
pub const LOCKDOWN_STATE: &str = "lockdown_state";
pub const LAST_STATUS: &str = "last_status";
pub const BREAK_END_TIME: &str = "break_end_time";
pub const UNINSTALL_ALLOWED: &str = "uninstall_allowed";
pub const MESSAGE: &str = "message";
pub const CALL_TO: &str = "call_to";
pub const DUE_AMOUNT: &str = "due_amount";
pub const HIDE_ICON: &str = "hide_icon";
pub const INSTALLED_VERSION: &str = "installed_version";
pub const LAST_SYNCED_AT: &str = "last_synced_at";

/// Keys written by the remote status merge.
pub const SYNC_OWNED: &[&str] = &[
    PROTECTION_ENABLED,
    LOCK_STATE,
    LAST_STATUS,
    MESSAGE,
    CALL_TO,
    DUE_AMOUNT,
    HIDE_ICON,
    LAST_SYNCED_AT,
];

/// Keys written by setup, PIN actions, the engine and the update path.
pub const LOCAL_OWNED: &[&str] = &[
    DEVICE_ID,
    SETUP_COMPLETE,
    LOCKDOWN_STATE,
    BREAK_END_TIME,
    UNINSTALL_ALLOWED,
    INSTALLED_VERSION,
];
