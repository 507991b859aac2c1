//! Wire types for the remote status endpoint.
//!
//! The device sends a `StatusRequest` carrying its identifier; the server
//! answers with a JSON object whose fields are all optional. An absent field
//! means "no change", never "false". Servers in the wild send booleans as
//! `true`, `1`, `"1"` or `"true"` and numbers as strings, so every field is
//! decoded leniently; a value that cannot be interpreted counts as absent.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of the status request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub device_id: String,
}

/// Server-reported policy for one fetch. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    #[serde(rename = "is_freezed", default, deserialize_with = "loose_bool")]
    pub is_frozen: Option<bool>,

    #[serde(rename = "is_protected", default, deserialize_with = "loose_bool")]
    pub is_protected: Option<bool>,

    /// An empty string clears the stored message.
    #[serde(default, deserialize_with = "display_text")]
    pub message: Option<String>,

    /// An empty string clears the stored number.
    #[serde(default, deserialize_with = "display_text")]
    pub call_to: Option<String>,

    #[serde(rename = "amount", default, deserialize_with = "loose_int")]
    pub due_amount: Option<i64>,

    #[serde(default, deserialize_with = "loose_bool")]
    pub hide_icon: Option<bool>,

    #[serde(rename = "auto_uninstall", default, deserialize_with = "loose_bool")]
    pub force_uninstall: Option<bool>,

    #[serde(default, deserialize_with = "loose_string")]
    pub update_url: Option<String>,

    #[serde(rename = "app_version", default, deserialize_with = "loose_int")]
    pub server_version: Option<i64>,
}

impl RemoteStatus {
    /// Parse a raw response body. The body must be a JSON object; individual
    /// fields that are missing or unreadable are left as `None`.
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(body)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("status payload is not a JSON object"));
        }
        serde_json::from_value(value)
    }

    pub fn wants_uninstall(&self) -> bool {
        self.force_uninstall == Some(true)
    }
}

fn loose_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Bool(b) => Some(b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }))
}

fn loose_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }))
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

/// Like `loose_string`, but a blank string is kept as `Some("")` so the
/// server can clear a lock-screen field.
fn display_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) if s.trim().is_empty() => Some(String::new()),
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}
