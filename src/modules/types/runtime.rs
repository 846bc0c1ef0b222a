//! Runtime value shapes returned by connectors

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoded resource options or action template (string keys, arbitrary values)
pub type Options = serde_json::Map<String, serde_json::Value>;

/// One result row: column/field name to value
pub type Row = HashMap<String, serde_json::Value>;

/// Outcome of validating resource options or an action template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResult {
    pub valid: bool,
}

impl ValidateResult {
    pub fn valid() -> Self {
        Self { valid: true }
    }

    pub fn invalid() -> Self {
        Self { valid: false }
    }
}

/// Outcome of a connectivity probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionResult {
    pub success: bool,
}

impl ConnectionResult {
    pub fn success() -> Self {
        Self { success: true }
    }
}

/// Source metadata (tables and columns, buckets, collections, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaInfoResult {
    pub success: bool,
    #[serde(default)]
    pub schema: HashMap<String, serde_json::Value>,
}

impl MetaInfoResult {
    pub fn new(schema: HashMap<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            schema,
        }
    }
}

/// The externally visible output of running an action
///
/// `extra` is always present, possibly empty. A successful run always
/// carries a row set, possibly empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResult {
    pub success: bool,
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl RuntimeResult {
    /// Successful result with the given rows and no extra metadata
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            success: true,
            rows,
            extra: HashMap::new(),
        }
    }

    /// Successful result with no rows
    pub fn empty() -> Self {
        Self::with_rows(Vec::new())
    }

    /// Successful result carrying a single row
    pub fn single(row: Row) -> Self {
        Self::with_rows(vec![row])
    }

    /// Attach a connector-specific metadata entry
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Failed result; `ActionResponse::error` pairs it with the reason
    pub fn failure() -> Self {
        Self {
            success: false,
            rows: Vec::new(),
            extra: HashMap::new(),
        }
    }
}

/// Response envelope handed to the outer layer (CLI or HTTP controller)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Whether the action succeeded
    pub success: bool,
    /// Error message if the action failed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Stable error kind if the action failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Result rows
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Connector-specific metadata
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ActionResponse {
    /// Create a successful response from a runtime result
    pub fn success(result: RuntimeResult) -> Self {
        Self {
            success: result.success,
            error: String::new(),
            kind: None,
            rows: result.rows,
            extra: result.extra,
        }
    }

    /// Create an error response around a failed runtime result
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: Some(kind.into()),
            ..Self::success(RuntimeResult::failure())
        }
    }
}
