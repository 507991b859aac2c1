//! Merge a fetched status into the policy store.
//!
//! For every optional field: absent means keep the stored value, present
//! means overwrite. Server booleans are translated into the record's
//! protection/lock vocabulary, and a lock is never kept without protection.

use crate::policy::types::LockState;
use crate::remote::client::FetchedStatus;
use crate::remote::protocol::RemoteStatus;
use crate::store::{PolicyStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One stored field that actually changed during a merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    Protection(bool),
    Lock(LockState),
    Message(String),
    CallTo(String),
    DueAmount(i64),
    HideIcon(bool),
}

/// A request to install a newer build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateDirective {
    pub url: String,
    pub version: i64,
}

/// Instructions for the remote command executor carried by a status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Directives {
    pub force_uninstall: bool,
    pub update: Option<UpdateDirective>,
}

impl Directives {
    pub fn from_status(status: &RemoteStatus) -> Self {
        let update = match (&status.update_url, status.server_version) {
            (Some(url), Some(version)) => Some(UpdateDirective {
                url: url.trim().to_string(),
                version,
            }),
            _ => None,
        };
        Self {
            force_uninstall: status.wants_uninstall(),
            update,
        }
    }
}

/// What a merge changed, handed to the lockdown engine and the executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusDiff {
    pub changes: Vec<FieldChange>,
    pub directives: Directives,
}

impl StatusDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn protection_changed(&self) -> Option<bool> {
        self.changes.iter().find_map(|c| match c {
            FieldChange::Protection(p) => Some(*p),
            _ => None,
        })
    }

    pub fn lock_changed(&self) -> Option<LockState> {
        self.changes.iter().find_map(|c| match c {
            FieldChange::Lock(l) => Some(*l),
            _ => None,
        })
    }
}

/// Apply `fetched` to the store and return the effective diff.
pub fn merge_status(
    store: &PolicyStore,
    fetched: &FetchedStatus,
    now: DateTime<Utc>,
) -> Result<StatusDiff, StoreError> {
    let status = &fetched.status;
    let mut changes = Vec::new();

    if let Some(protected) = status.is_protected {
        if store.protection_enabled() != protected {
            store.set_protection_enabled(protected)?;
            changes.push(FieldChange::Protection(protected));
        }
    }

    let protected = store.protection_enabled();
    let current_lock = store.lock_state();
    let target_lock = match status.is_frozen {
        Some(true) if protected => LockState::Locked,
        Some(_) => LockState::Active,
        // Frozen flag absent: keep the stored lock unless protection went away.
        None if !protected => LockState::Active,
        None => current_lock,
    };
    if target_lock != current_lock {
        store.set_lock_state(target_lock)?;
        changes.push(FieldChange::Lock(target_lock));
    }

    // An empty value clears the field; the store reads blank as unset.
    if let Some(ref message) = status.message {
        if store.message().unwrap_or_default() != *message {
            store.set_message(message)?;
            changes.push(FieldChange::Message(message.clone()));
        }
    }

    if let Some(ref call_to) = status.call_to {
        if store.call_to().unwrap_or_default() != *call_to {
            store.set_call_to(call_to)?;
            changes.push(FieldChange::CallTo(call_to.clone()));
        }
    }

    if let Some(amount) = status.due_amount {
        if store.due_amount() != amount {
            store.set_due_amount(amount)?;
            changes.push(FieldChange::DueAmount(amount));
        }
    }

    if let Some(hide) = status.hide_icon {
        if store.hide_icon() != hide {
            store.set_hide_icon(hide)?;
            changes.push(FieldChange::HideIcon(hide));
        }
    }

    store.mark_synced(now, &fetched.raw)?;

    Ok(StatusDiff {
        changes,
        directives: Directives::from_status(status),
    })
}
