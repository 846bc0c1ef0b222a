//! Resource and action descriptors

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use switchyard_types::{Options, ResourceType};

/// A user-configured binding to an external data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource type tag (kept as text so unknown tags reach the dispatcher)
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Connection options; shape determined by the type
    #[serde(default)]
    pub options: Options,
}

impl ResourceDescriptor {
    /// Create a new resource descriptor
    pub fn new(resource_type: impl Into<String>, options: Options) -> Self {
        Self {
            resource_type: resource_type.into(),
            options,
        }
    }

    /// Parse the type tag, if it is one of the recognised types
    pub fn kind(&self) -> Option<ResourceType> {
        ResourceType::from_str(&self.resource_type).ok()
    }
}

/// A single invocation template against a resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Action type tag; defaults to the resource type when omitted
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,

    /// Action template; shape determined by the type
    #[serde(default)]
    pub template: Options,
}

impl ActionDescriptor {
    /// Create a new action descriptor
    pub fn new(action_type: impl Into<String>, template: Options) -> Self {
        Self {
            action_type: Some(action_type.into()),
            template,
        }
    }

    /// The effective type tag, falling back to the resource's tag
    pub fn effective_type<'a>(&'a self, resource: &'a ResourceDescriptor) -> &'a str {
        self.action_type
            .as_deref()
            .unwrap_or(&resource.resource_type)
    }
}
