//! Launcher icon visibility for the disguise presentation.

use crate::platform::LauncherAlias;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconVisibility {
    Visible,
    Hidden,
}

pub struct IconController {
    launcher: Arc<dyn LauncherAlias>,
}

impl IconController {
    pub fn new(launcher: Arc<dyn LauncherAlias>) -> Self {
        Self { launcher }
    }

    /// Toggle the launcher alias. Platforms that cannot hide it, or refuse
    /// to, leave the icon visible; this never fails.
    pub fn apply(&self, hide: bool) -> IconVisibility {
        if !self.launcher.supports_hiding() {
            if hide {
                tracing::debug!("icon hiding unsupported, staying visible");
            }
            return IconVisibility::Visible;
        }
        match self.launcher.set_alias_enabled(!hide) {
            Ok(()) if hide => IconVisibility::Hidden,
            Ok(()) => IconVisibility::Visible,
            Err(e) => {
                tracing::warn!(error = %e, hide, "launcher alias change failed");
                // The alias was left as it was; a failed hide keeps it shown.
                if hide {
                    IconVisibility::Visible
                } else {
                    IconVisibility::Hidden
                }
            }
        }
    }
}
