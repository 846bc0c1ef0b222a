//! Action file validation

use once_cell::sync::Lazy;
use regex::Regex;
use std::str::FromStr;
use switchyard_core::{ActionFile, SwitchyardError};
use switchyard_types::ResourceType;

/// Valid action names: lower-kebab-case or lower_snake_case
static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(?:[-_][a-z0-9]+)*$").unwrap()
});

/// Structural checks on an action file, run before any connector is built
pub struct ActionFileValidator {
    strict_names: bool,
}

impl ActionFileValidator {
    pub fn new() -> Self {
        Self { strict_names: true }
    }

    /// Accept any non-empty action name
    pub fn lenient() -> Self {
        Self {
            strict_names: false,
        }
    }

    pub fn validate(&self, file: &ActionFile) -> Result<(), SwitchyardError> {
        self.validate_name(&file.name)?;
        let resource_type = self.validate_resource_type(&file.resource.resource_type)?;
        if let Some(action_type) = &file.action.action_type {
            self.validate_action_type(resource_type, action_type)?;
        }
        Ok(())
    }

    fn validate_name(&self, name: &str) -> Result<(), SwitchyardError> {
        if name.is_empty() {
            return Err(SwitchyardError::Config(
                "Action name cannot be empty".to_string(),
            ));
        }

        if self.strict_names && !NAME_PATTERN.is_match(name) {
            return Err(SwitchyardError::Config(format!(
                "Invalid action name '{}': must be lower-kebab-case or lower_snake_case",
                name
            )));
        }

        Ok(())
    }

    fn validate_resource_type(&self, tag: &str) -> Result<ResourceType, SwitchyardError> {
        ResourceType::from_str(tag).map_err(|_| SwitchyardError::UnsupportedType(tag.to_string()))
    }

    /// The action type may name an alias, but it must land on the resource's connector
    fn validate_action_type(
        &self,
        resource_type: ResourceType,
        action_tag: &str,
    ) -> Result<(), SwitchyardError> {
        let action_type = ResourceType::from_str(action_tag)
            .map_err(|_| SwitchyardError::UnsupportedType(action_tag.to_string()))?;

        if action_type.family() != resource_type.family() {
            return Err(SwitchyardError::Config(format!(
                "Action type '{}' cannot run against a '{}' resource",
                action_type, resource_type
            )));
        }

        Ok(())
    }
}

impl Default for ActionFileValidator {
    fn default() -> Self {
        Self::new()
    }
}
