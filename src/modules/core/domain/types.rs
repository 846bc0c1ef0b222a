//! Runtime settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SwitchyardError;

const DEFAULT_S3_MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024;
const DEFAULT_SQL_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Settings shared by every connector built from a registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Largest S3 object read, downloaded or uploaded, in bytes (default: 5 MiB)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_max_object_size: Option<u64>,

    /// SQL connect timeout in seconds (default: 5)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_connect_timeout_secs: Option<u64>,

    /// HTTP request timeout in seconds (default: client library default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,

    /// Service endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,
}

impl RuntimeConfig {
    /// Get the S3 object ceiling with default fallback
    pub fn s3_max_object_size(&self) -> u64 {
        self.s3_max_object_size.unwrap_or(DEFAULT_S3_MAX_OBJECT_SIZE)
    }

    /// Get the SQL connect timeout with default fallback
    pub fn sql_connect_timeout(&self) -> Duration {
        Duration::from_secs(
            self.sql_connect_timeout_secs
                .unwrap_or(DEFAULT_SQL_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Get the HTTP timeout, if one was configured
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }

    /// Apply `SWITCHYARD_*` environment variables on top of these settings
    pub fn with_env_overrides(self) -> Result<Self, SwitchyardError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, SwitchyardError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |name: &str| -> Result<Option<u64>, SwitchyardError> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
                    SwitchyardError::Config(format!(
                        "{} must be a non-negative integer, got '{}'",
                        name, raw
                    ))
                }),
            }
        };

        if let Some(size) = number("SWITCHYARD_S3_MAX_OBJECT_SIZE")? {
            self.s3_max_object_size = Some(size);
        }
        if let Some(secs) = number("SWITCHYARD_SQL_CONNECT_TIMEOUT")? {
            self.sql_connect_timeout_secs = Some(secs);
        }
        if let Some(secs) = number("SWITCHYARD_HTTP_TIMEOUT")? {
            self.http_timeout_secs = Some(secs);
        }
        if let Some(url) = lookup("SWITCHYARD_AIAGENT_URL") {
            self.endpoints.aiagent = Some(url);
        }
        if let Some(token) = lookup("SWITCHYARD_AIAGENT_TOKEN") {
            self.endpoints.aiagent_token = Some(token);
        }
        Ok(self)
    }
}

/// Base URLs of hosted services; overridable for private deployments and tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub huggingface: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub airtable: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_sheets: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_drive: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub firestore: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_toolkit: Option<String>,

    /// Virtual resource service executing `aiagent` actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aiagent: Option<String>,

    /// Token presented to the virtual resource service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aiagent_token: Option<String>,
}

impl EndpointConfig {
    pub fn huggingface(&self) -> &str {
        self.huggingface
            .as_deref()
            .unwrap_or("https://api-inference.huggingface.co/models/")
    }

    pub fn airtable(&self) -> &str {
        self.airtable.as_deref().unwrap_or("https://api.airtable.com/v0")
    }

    pub fn google_sheets(&self) -> &str {
        self.google_sheets
            .as_deref()
            .unwrap_or("https://sheets.googleapis.com/v4")
    }

    pub fn google_drive(&self) -> &str {
        self.google_drive
            .as_deref()
            .unwrap_or("https://www.googleapis.com/drive/v3")
    }

    pub fn firestore(&self) -> &str {
        self.firestore
            .as_deref()
            .unwrap_or("https://firestore.googleapis.com/v1")
    }

    pub fn identity_toolkit(&self) -> &str {
        self.identity_toolkit
            .as_deref()
            .unwrap_or("https://identitytoolkit.googleapis.com/v1")
    }
}
