//! Root action file model

use serde::{Deserialize, Serialize};

use super::{ActionDescriptor, ResourceDescriptor, RuntimeConfig};

/// Identifiers reported to the audit sink
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

/// A self-contained action file: one resource, one action, optional settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionFile {
    /// Name of the action
    pub name: String,

    /// Resource the action runs against
    pub resource: ResourceDescriptor,

    /// The action template
    pub action: ActionDescriptor,

    /// Runtime settings (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<RuntimeConfig>,

    /// Audit identifiers (optional)
    #[serde(default)]
    pub ids: ActionIds,
}

impl ActionFile {
    /// Create a new action file
    pub fn new(
        name: impl Into<String>,
        resource: ResourceDescriptor,
        action: ActionDescriptor,
    ) -> Self {
        Self {
            name: name.into(),
            resource,
            action,
            settings: None,
            ids: ActionIds::default(),
        }
    }

    /// The effective runtime settings, defaulting when absent
    pub fn runtime_config(&self) -> RuntimeConfig {
        self.settings.clone().unwrap_or_default()
    }

    /// The action's effective type tag
    pub fn action_type(&self) -> &str {
        self.action.effective_type(&self.resource)
    }
}
