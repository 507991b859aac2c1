//! Typed access to the persisted device record.

use crate::policy::types::{DeviceRecord, LockState, LockdownState};
use crate::store::keys;
use crate::store::kv::{KeyValueStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Typed view over a shared `KeyValueStore`. Cheap to clone; every clone
/// talks to the same backend.
#[derive(Clone)]
pub struct PolicyStore {
    kv: Arc<dyn KeyValueStore>,
}

impl PolicyStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Snapshot of the whole record. Missing keys take first-run defaults.
    pub fn record(&self) -> DeviceRecord {
        DeviceRecord {
            device_id: self.device_id(),
            setup_complete: self.setup_complete(),
            protection_enabled: self.protection_enabled(),
            lock_state: self.lock_state(),
            break_end_time: self.break_end_time(),
            uninstall_allowed: self.uninstall_allowed(),
            due_amount: self.due_amount(),
            message: self.message(),
            call_to: self.call_to(),
            hide_icon: self.hide_icon(),
            installed_version: self.installed_version(),
            last_synced_at: self.last_synced_at(),
        }
    }

    /// Wipe every persisted key (confirmed self-removal).
    pub fn clear(&self) -> Result<(), StoreError> {
        self.kv.clear()
    }

    /// Re-read values written by other processes.
    pub fn refresh(&self) -> Result<(), StoreError> {
        self.kv.refresh()
    }

    // ── Device identity ──

    /// Default: none.
    pub fn device_id(&self) -> Option<String> {
        self.get_string(keys::DEVICE_ID)
    }

    pub fn set_device_id(&self, id: &str) -> Result<(), StoreError> {
        self.kv.set(keys::DEVICE_ID, id.trim().to_string())
    }

    /// Default: false.
    pub fn setup_complete(&self) -> bool {
        self.get_bool(keys::SETUP_COMPLETE)
    }

    pub fn set_setup_complete(&self, value: bool) -> Result<(), StoreError> {
        self.set_bool(keys::SETUP_COMPLETE, value)
    }

    // ── Protection / uninstall pair ──
    //
    // These two setters write both keys: uninstall_allowed and
    // protection_enabled are never true together.

    /// Default: false.
    pub fn protection_enabled(&self) -> bool {
        self.get_bool(keys::PROTECTION_ENABLED)
    }

    pub fn set_protection_enabled(&self, value: bool) -> Result<(), StoreError> {
        if value {
            self.set_bool(keys::UNINSTALL_ALLOWED, false)?;
        }
        self.set_bool(keys::PROTECTION_ENABLED, value)
    }

    /// Default: false.
    pub fn uninstall_allowed(&self) -> bool {
        self.get_bool(keys::UNINSTALL_ALLOWED) && !self.protection_enabled()
    }

    pub fn set_uninstall_allowed(&self, value: bool) -> Result<(), StoreError> {
        if value {
            self.set_bool(keys::PROTECTION_ENABLED, false)?;
        }
        self.set_bool(keys::UNINSTALL_ALLOWED, value)
    }

    // ── Lock ──

    /// Default: ACTIVE.
    pub fn lock_state(&self) -> LockState {
        self.get_string(keys::LOCK_STATE)
            .and_then(|s| LockState::from_str_loose(&s))
            .unwrap_or_default()
    }

    pub fn set_lock_state(&self, state: LockState) -> Result<(), StoreError> {
        self.kv.set(keys::LOCK_STATE, state.to_string())
    }

    /// Engine state persisted across restarts. None on a fresh install.
    pub fn lockdown_state(&self) -> Option<LockdownState> {
        self.get_string(keys::LOCKDOWN_STATE)
            .and_then(|s| LockdownState::from_str_loose(&s))
    }

    pub fn set_lockdown_state(&self, state: LockdownState) -> Result<(), StoreError> {
        self.kv.set(keys::LOCKDOWN_STATE, state.to_string())
    }

    /// Default: none.
    pub fn break_end_time(&self) -> Option<DateTime<Utc>> {
        self.get_time(keys::BREAK_END_TIME)
    }

    pub fn set_break_end_time(&self, end: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        self.set_time(keys::BREAK_END_TIME, end)
    }

    // ── Server-provided display fields ──

    pub fn message(&self) -> Option<String> {
        self.get_string(keys::MESSAGE)
    }

    pub fn set_message(&self, message: &str) -> Result<(), StoreError> {
        self.kv.set(keys::MESSAGE, message.to_string())
    }

    pub fn call_to(&self) -> Option<String> {
        self.get_string(keys::CALL_TO)
    }

    pub fn set_call_to(&self, number: &str) -> Result<(), StoreError> {
        self.kv.set(keys::CALL_TO, number.to_string())
    }

    /// Default: 0.
    pub fn due_amount(&self) -> i64 {
        self.get_i64(keys::DUE_AMOUNT)
    }

    pub fn set_due_amount(&self, amount: i64) -> Result<(), StoreError> {
        self.kv.set(keys::DUE_AMOUNT, amount.to_string())
    }

    /// Default: false.
    pub fn hide_icon(&self) -> bool {
        self.get_bool(keys::HIDE_ICON)
    }

    pub fn set_hide_icon(&self, hide: bool) -> Result<(), StoreError> {
        self.set_bool(keys::HIDE_ICON, hide)
    }

    // ── Versions and sync bookkeeping ──

    /// Default: 0.
    pub fn installed_version(&self) -> i64 {
        self.get_i64(keys::INSTALLED_VERSION)
    }

    pub fn set_installed_version(&self, version: i64) -> Result<(), StoreError> {
        self.kv.set(keys::INSTALLED_VERSION, version.to_string())
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.get_time(keys::LAST_SYNCED_AT)
    }

    /// Raw JSON of the last status payload that was merged.
    pub fn last_status(&self) -> Option<String> {
        self.get_string(keys::LAST_STATUS)
    }

    pub fn mark_synced(&self, at: DateTime<Utc>, raw_status: &str) -> Result<(), StoreError> {
        self.kv.set(keys::LAST_STATUS, raw_status.to_string())?;
        self.set_time(keys::LAST_SYNCED_AT, Some(at))
    }

    // ── Encoding helpers ──

    fn get_string(&self, key: &str) -> Option<String> {
        self.kv.get(key).filter(|s| !s.is_empty())
    }

    fn get_bool(&self, key: &str) -> bool {
        matches!(self.kv.get(key).as_deref(), Some("true") | Some("1"))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.kv.set(key, value.to_string())
    }

    fn get_i64(&self, key: &str) -> i64 {
        self.kv
            .get(key)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    fn get_time(&self, key: &str) -> Option<DateTime<Utc>> {
        self.kv
            .get(key)
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    fn set_time(&self, key: &str, value: Option<DateTime<Utc>>) -> Result<(), StoreError> {
        match value {
            Some(t) => self.kv.set(key, t.to_rfc3339()),
            None => self.kv.remove(key),
        }
    }
}
