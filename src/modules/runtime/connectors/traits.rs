//! Connector trait definition

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use switchyard_core::SwitchyardError;
use switchyard_types::{
    ConnectionResult, MetaInfoResult, Options, ResourceType, RuntimeResult, ValidateResult,
};

/// Trait implemented by every data source adapter
///
/// A connector is stateless: every handle it needs is opened inside the
/// operation that needs it and released before that operation returns, on
/// success and failure alike. Validation never performs I/O.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The resource type this connector was built for
    fn resource_type(&self) -> ResourceType;

    /// Decode and check resource options
    ///
    /// Fails with `InvalidResource` when a required field is missing or an
    /// enumerated value is out of range.
    fn validate_resource_options(&self, options: &Options)
        -> Result<ValidateResult, SwitchyardError>;

    /// Decode and check an action template
    ///
    /// Fails with `InvalidAction` under the same discipline.
    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError>;

    /// Open a session and issue a lightweight probe
    async fn test_connection(&self, _options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        Err(SwitchyardError::Unsupported(format!(
            "{} does not support connection tests",
            self.resource_type()
        )))
    }

    /// Describe the resource's schema
    async fn get_meta_info(&self, _options: &Options) -> Result<MetaInfoResult, SwitchyardError> {
        Err(SwitchyardError::Unsupported(format!(
            "{} does not expose meta information",
            self.resource_type()
        )))
    }

    /// Perform the action
    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError>;
}

/// Decode resource options into a connector-specific shape
pub fn decode_resource<T: DeserializeOwned>(options: &Options) -> Result<T, SwitchyardError> {
    serde_json::from_value(serde_json::Value::Object(options.clone()))
        .map_err(|e| SwitchyardError::InvalidResource(e.to_string()))
}

/// Decode an action template into a connector-specific shape
pub fn decode_action<T: DeserializeOwned>(options: &Options) -> Result<T, SwitchyardError> {
    serde_json::from_value(serde_json::Value::Object(options.clone()))
        .map_err(|e| SwitchyardError::InvalidAction(e.to_string()))
}

/// Fail with `InvalidResource` when a required text field is blank
pub fn require_resource(value: &str, field: &str) -> Result<(), SwitchyardError> {
    if value.trim().is_empty() {
        return Err(SwitchyardError::InvalidResource(format!(
            "{} is required",
            field
        )));
    }
    Ok(())
}

/// Fail with `InvalidAction` when a required text field is blank
pub fn require_action(value: &str, field: &str) -> Result<(), SwitchyardError> {
    if value.trim().is_empty() {
        return Err(SwitchyardError::InvalidAction(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Endpoint {
        host: String,
        #[serde(default)]
        port: Option<u16>,
    }

    fn options(value: serde_json::Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_decode_maps_error_kinds() {
        let endpoint: Endpoint = decode_resource(&options(json!({"host": "db", "port": 5432}))).unwrap();
        assert_eq!(endpoint.host, "db");
        assert_eq!(endpoint.port, Some(5432));

        let err = decode_resource::<Endpoint>(&options(json!({"port": 1}))).unwrap_err();
        assert!(matches!(err, SwitchyardError::InvalidResource(m) if m.contains("host")));

        let err = decode_action::<Endpoint>(&options(json!({}))).unwrap_err();
        assert!(matches!(err, SwitchyardError::InvalidAction(_)));
    }

    struct Bare;

    #[async_trait]
    impl Connector for Bare {
        fn resource_type(&self) -> ResourceType {
            ResourceType::RestApi
        }

        fn validate_resource_options(&self, _: &Options) -> Result<ValidateResult, SwitchyardError> {
            Ok(ValidateResult::valid())
        }

        fn validate_action_options(&self, _: &Options) -> Result<ValidateResult, SwitchyardError> {
            Ok(ValidateResult::valid())
        }

        async fn run(&self, _: &Options, _: &Options) -> Result<RuntimeResult, SwitchyardError> {
            Ok(RuntimeResult::empty())
        }
    }

    #[test]
    fn test_default_checks_are_unsupported() {
        let err = tokio_test::block_on(Bare.test_connection(&Options::new())).unwrap_err();
        assert!(matches!(err, SwitchyardError::Unsupported(m) if m.starts_with("restapi")));
        let err = tokio_test::block_on(Bare.get_meta_info(&Options::new())).unwrap_err();
        assert!(matches!(err, SwitchyardError::Unsupported(_)));
    }

    #[test]
    fn test_require_helpers() {
        assert!(require_resource("db", "host").is_ok());
        assert!(matches!(
            require_resource("  ", "host"),
            Err(SwitchyardError::InvalidResource(m)) if m == "host is required"
        ));
        assert!(matches!(
            require_action("", "query"),
            Err(SwitchyardError::InvalidAction(_))
        ));
    }
}
