//! Configuration template written by `lockwarden init`.
//!
//! Every value shown is the built-in default; uncomment and edit what the
//! deployment needs. `DEFAULT_CONFIG_YAML` must parse to exactly
//! `AgentConfig::default()` (see the test below).

pub const DEFAULT_CONFIG_YAML: &str = r#"# Lockwarden agent configuration.

server:
  # Endpoint that receives {"device_id": "..."} and answers with the status.
  status_url: https://manage.example.com/api/device/status
  timeout_secs: 30

# PIN for unlock, break and protection removal. Change this before rollout.
pin: "1133"

# Length of a break granted from the lock surface.
break_minutes: 2

# How often the server is polled for status.
poll_interval_minutes: 15

own_package: com.lockwarden.agent

# Names the agent is presented under. Text mentioning them on a settings or
# package-management page is treated as a removal attempt.
disguise_names:
  - Lockwarden
  - Device Care

admin_dial_code: "*#1133#"

installed_version: 1

kiosk:
  # clear_all | retain_while_protected
  restriction_retention: retain_while_protected

# watcher:
#   restricted_packages: ["com.android.settings", "com.android.packageinstaller"]
#   restricted_text: ["*uninstall*", "*force stop*"]
#   allowed_packages: ["com.android.dialer"]
#   shade_packages: ["com.android.systemui"]
#   denial_notice: This action is blocked by your device administrator

platform:
  # shell | simulated
  kind: shell
  device_owner: false
  launcher_alias: com.lockwarden.agent/.LauncherAlias
  lock_activity: com.lockwarden.agent/.LockActivity
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_config_str;
    use crate::config::types::AgentConfig;

    #[test]
    fn test_template_matches_builtin_defaults() {
        let config = parse_config_str(DEFAULT_CONFIG_YAML).unwrap();
        assert_eq!(config, AgentConfig::default());
    }
}
