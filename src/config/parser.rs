//! YAML configuration loader.
//!
//! A missing file yields the built-in defaults; a present file is parsed
//! over the defaults (every section is optional) and then validated.
//!
//! # Example
//! ```yaml
//! server:
//!   status_url: https://manage.example.com/api/device/status
//! pin: "4821"
//! break_minutes: 2
//! watcher:
//!   restricted_text: ["*uninstall*", "*force stop*"]
//! ```

use crate::config::types::AgentConfig;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Load the configuration file, falling back to defaults when it is absent.
pub fn parse_config_file(path: impl AsRef<Path>) -> Result<AgentConfig> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(AgentConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse and validate a YAML configuration string.
pub fn parse_config_str(yaml: &str) -> Result<AgentConfig> {
    // An empty document deserializes to unit, not to the default struct.
    if yaml.trim().is_empty() {
        return Ok(AgentConfig::default());
    }
    let config: AgentConfig =
        serde_yaml::from_str(yaml).context("Invalid YAML syntax in config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &AgentConfig) -> Result<()> {
    let url = config.server.status_url.trim();
    if url.is_empty() {
        bail!("'server.status_url' must not be empty");
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("'server.status_url' must be an http(s) URL, got '{}'", url);
    }
    if config.server.timeout_secs == 0 {
        bail!("'server.timeout_secs' must be positive");
    }

    if config.pin.is_empty() || !config.pin.chars().all(|c| c.is_ascii_digit()) {
        bail!("'pin' must be a non-empty string of digits");
    }
    if config.break_minutes <= 0 {
        bail!("'break_minutes' must be positive, got {}", config.break_minutes);
    }
    if config.poll_interval_minutes == 0 {
        bail!("'poll_interval_minutes' must be positive");
    }
    if config.own_package.trim().is_empty() {
        bail!("'own_package' must not be empty");
    }
    if config.admin_dial_code.trim().is_empty() {
        bail!("'admin_dial_code' must not be empty");
    }

    let watcher = &config.watcher;
    for (field, patterns) in [
        ("watcher.restricted_packages", &watcher.restricted_packages),
        ("watcher.allowed_packages", &watcher.allowed_packages),
        ("watcher.shade_packages", &watcher.shade_packages),
    ] {
        for pattern in patterns {
            globset::Glob::new(pattern)
                .with_context(|| format!("{}: invalid glob pattern '{}'", field, pattern))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{PlatformKind, RestrictionRetention};

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let yaml = r#"
server:
  status_url: https://mdm.example.org/status
pin: "4821"
"#;
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.server.status_url, "https://mdm.example.org/status");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.pin, "4821");
        assert_eq!(config.break_minutes, 2);
        assert_eq!(
            config.kiosk.restriction_retention,
            RestrictionRetention::RetainWhileProtected
        );
    }

    #[test]
    fn test_parse_platform_and_retention() {
        let yaml = r#"
kiosk:
  restriction_retention: clear_all
platform:
  kind: simulated
  device_owner: true
"#;
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.kiosk.restriction_retention, RestrictionRetention::ClearAll);
        assert_eq!(config.platform.kind, PlatformKind::Simulated);
        assert!(config.platform.device_owner);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(parse_config_str("").unwrap(), AgentConfig::default());
        assert_eq!(parse_config_str("\n# nothing\n").unwrap(), AgentConfig::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = parse_config_file(tmp.path().join("config.yaml")).unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_reject_non_numeric_pin() {
        assert!(parse_config_str("pin: \"12ab\"").is_err());
        assert!(parse_config_str("pin: \"\"").is_err());
    }

    #[test]
    fn test_reject_bad_intervals() {
        assert!(parse_config_str("break_minutes: 0").is_err());
        assert!(parse_config_str("poll_interval_minutes: 0").is_err());
    }

    #[test]
    fn test_reject_bad_url() {
        let yaml = "server:\n  status_url: ftp://example.com/status";
        assert!(parse_config_str(yaml).is_err());
        let yaml = "server:\n  status_url: \"\"";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn test_reject_invalid_glob() {
        let yaml = "watcher:\n  allowed_packages: [\"com.[bad\"]";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn test_reject_invalid_yaml() {
        assert!(parse_config_str("pin: [unclosed").is_err());
    }
}
