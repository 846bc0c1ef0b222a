//! Option conventions shared across connectors

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::Row;

/// Deserialize a port given either as a JSON number or a numeric string
pub fn flexible_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid port: {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid port: {}",
            other
        ))),
    }
}

/// Deserialize a non-negative count given as a JSON number or a numeric string
pub fn flexible_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid number: {}", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {}", s))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid number: {}",
            other
        ))),
    }
}

/// Deserialize a JSON value that may also arrive as a JSON-encoded string
pub fn json_or_string<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid JSON: {}", e))),
        other => Ok(other.filter(|v| !v.is_null())),
    }
}

/// Deserialize a boolean that may be given as `"true"`/`"false"`
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(Value::String(s)) => Ok(s.eq_ignore_ascii_case("true")),
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid boolean: {}",
            other
        ))),
    }
}

/// One `{key, value}` entry of a header, cookie, parameter or form list
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct KeyValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

impl KeyValue {
    /// Render the value as text; strings are taken verbatim
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Flatten a key/value list into ordered text pairs, skipping empty keys
pub fn pairs(list: &[KeyValue]) -> Vec<(String, String)> {
    list.iter()
        .filter(|kv| !kv.key.trim().is_empty())
        .map(|kv| (kv.key.clone(), kv.value_text()))
        .collect()
}

/// Collapse a key/value list into a JSON object; later keys win
pub fn collapse(list: &[KeyValue]) -> serde_json::Map<String, Value> {
    list.iter()
        .filter(|kv| !kv.key.trim().is_empty())
        .map(|kv| (kv.key.clone(), kv.value.clone()))
        .collect()
}

fn merge_with(
    base: &[KeyValue],
    overrides: &[KeyValue],
    same_key: impl Fn(&str, &str) -> bool,
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = pairs(base);
    for (key, value) in pairs(overrides) {
        match merged.iter_mut().find(|(k, _)| same_key(k, &key)) {
            Some(existing) => *existing = (key, value),
            None => merged.push((key, value)),
        }
    }
    merged
}

/// Merge two key/value lists; entries from `overrides` replace `base` on equal keys
pub fn merge_pairs(base: &[KeyValue], overrides: &[KeyValue]) -> Vec<(String, String)> {
    merge_with(base, overrides, |a, b| a == b)
}

/// Merge two header lists; header names compare case-insensitively
pub fn merge_headers(base: &[KeyValue], overrides: &[KeyValue]) -> Vec<(String, String)> {
    merge_with(base, overrides, |a, b| a.eq_ignore_ascii_case(b))
}

/// Build the per-call HTTP client
pub fn http_client(config: &RuntimeConfig) -> Result<reqwest::Client, SwitchyardError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.http_timeout() {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| SwitchyardError::ConnectFailed(format!("HTTP client: {}", e)))
}

/// Map a transport error to `ConnectFailed`
pub fn transport_error(context: &str, err: reqwest::Error) -> SwitchyardError {
    SwitchyardError::ConnectFailed(format!("{}: {}", context, err))
}

/// Read a response body as JSON, mapping non-2xx statuses to `OperationFailed`
pub async fn json_response(
    context: &str,
    response: reqwest::Response,
) -> Result<Value, SwitchyardError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SwitchyardError::OperationFailed(format!("{}: {}", context, e)))?;

    if !status.is_success() {
        return Err(SwitchyardError::OperationFailed(format!(
            "{} failed (HTTP {}): {}",
            context,
            status.as_u16(),
            body.chars().take(500).collect::<String>()
        )));
    }

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| {
        SwitchyardError::OperationFailed(format!("{}: invalid JSON response: {}", context, e))
    })
}

/// Turn a JSON value into rows: objects become one row, arrays of objects one row each
pub fn value_to_rows(value: Value) -> Vec<Row> {
    match value {
        Value::Object(map) => vec![map.into_iter().collect()],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map.into_iter().collect()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Render a header name in canonical MIME form (`x-req` → `X-Req`)
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Run a connect future under the configured connect timeout
pub async fn connect_with_timeout<T, F>(
    timeout: std::time::Duration,
    label: &str,
    connect: F,
) -> Result<T, SwitchyardError>
where
    F: std::future::Future<Output = Result<T, SwitchyardError>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(result) => result,
        Err(_) => Err(SwitchyardError::ConnectFailed(format!(
            "{} connection timed out after {}s",
            label,
            timeout.as_secs()
        ))),
    }
}
