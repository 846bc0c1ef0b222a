//! Action dispatch
//!
//! One dispatch is one end-to-end execution of an action against its
//! resource: build a connector, validate the resource options, validate the
//! action template, optionally probe the connection, then run. Nothing is
//! opened before both validations pass.

mod audit;
mod virtual_resource;

pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use virtual_resource::{agent_call, HttpVirtualResourceClient, VirtualResourceClient};

use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use switchyard_core::{ActionFile, RuntimeConfig, SwitchyardError};
use switchyard_types::{
    ActionResponse, ConnectionResult, MetaInfoResult, Options, ResourceType, RuntimeResult,
    ValidateResult,
};
use tracing::{debug, error, info};

use crate::connectors::{Connector, ConnectorFactory, Registry};

/// Inputs of one `run_action` call
#[derive(Debug, Clone, Default)]
pub struct DispatchRequest {
    pub resource_type: String,
    pub resource_options: Options,
    pub action_options: Options,
    pub action_id: Option<String>,
    pub resource_id: Option<String>,
    /// Probe the connection after validation and before running
    pub test_connection: bool,
}

impl DispatchRequest {
    pub fn new(resource_type: impl Into<String>, resource_options: Options, action_options: Options) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_options,
            action_options,
            ..Self::default()
        }
    }

    pub fn with_ids(mut self, action_id: Option<String>, resource_id: Option<String>) -> Self {
        self.action_id = action_id;
        self.resource_id = resource_id;
        self
    }

    pub fn with_connection_test(mut self, test_connection: bool) -> Self {
        self.test_connection = test_connection;
        self
    }
}

impl From<&ActionFile> for DispatchRequest {
    fn from(file: &ActionFile) -> Self {
        DispatchRequest::new(
            file.action.effective_type(&file.resource),
            file.resource.options.clone(),
            file.action.template.clone(),
        )
        .with_ids(file.ids.action_id.clone(), file.ids.resource_id.clone())
    }
}

/// Runs actions through a connector factory
pub struct ActionDispatcher {
    factory: Arc<dyn ConnectorFactory>,
    audit: Option<Arc<dyn AuditSink>>,
    virtual_client: Option<Arc<dyn VirtualResourceClient>>,
}

impl ActionDispatcher {
    /// A dispatcher over the built-in registry
    ///
    /// The ai-agent client is set up when `config` names its endpoint.
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        let virtual_client = HttpVirtualResourceClient::from_config(&config)
            .map(|client| Arc::new(client) as Arc<dyn VirtualResourceClient>);
        Self {
            factory: Arc::new(Registry::new(config)),
            audit: None,
            virtual_client,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn ConnectorFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_virtual_client(mut self, client: Arc<dyn VirtualResourceClient>) -> Self {
        self.virtual_client = Some(client);
        self
    }

    /// Build a connector, failing with `UnsupportedType` when there is none
    ///
    /// Virtual types have no connector; callers that handle them check
    /// before calling this.
    fn connector(&self, tag: &str) -> Result<Box<dyn Connector>, SwitchyardError> {
        let unsupported = || SwitchyardError::UnsupportedType(tag.to_string());
        let resource_type = ResourceType::from_str(tag).map_err(|_| unsupported())?;
        self.factory.build(resource_type).ok_or_else(|| {
            if resource_type.is_virtual() {
                SwitchyardError::Unsupported(format!("{} is executed outside the connector core", tag))
            } else {
                unsupported()
            }
        })
    }

    /// Dispatch an action and report it to the audit sink
    pub async fn run_action(&self, request: DispatchRequest) -> Result<RuntimeResult, SwitchyardError> {
        info!(
            resource_type = %request.resource_type,
            action_id = request.action_id.as_deref().unwrap_or(""),
            "Dispatching action"
        );
        let result = self.dispatch(&request).await;

        match &result {
            Ok(r) => info!(rows = r.rows.len(), "Action completed"),
            Err(e) if e.is_error() => error!(kind = e.kind(), "Action failed: {}", e),
            Err(e) => info!(kind = e.kind(), "Action rejected: {}", e),
        }

        if let Some(sink) = &self.audit {
            sink.record(&AuditEvent {
                action_id: request.action_id.clone(),
                resource_id: request.resource_id.clone(),
                resource_type: request.resource_type.clone(),
                success: result.is_ok(),
                error_kind: result.as_ref().err().map(SwitchyardError::kind),
                template: request.action_options.clone(),
            });
        }
        result
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<RuntimeResult, SwitchyardError> {
        let tag = request.resource_type.as_str();
        let resource_type = ResourceType::from_str(tag)
            .map_err(|_| SwitchyardError::UnsupportedType(tag.to_string()))?;

        let connector = match self.factory.build(resource_type) {
            Some(connector) => connector,
            None if resource_type.is_virtual() => return self.run_virtual(resource_type, request).await,
            None => return Err(SwitchyardError::UnsupportedType(tag.to_string())),
        };

        ensure_valid(
            connector.validate_resource_options(&request.resource_options)?,
            || SwitchyardError::InvalidResource(format!("{} resource options are invalid", tag)),
        )?;
        ensure_valid(
            connector.validate_action_options(&request.action_options)?,
            || SwitchyardError::InvalidAction(format!("{} action options are invalid", tag)),
        )?;

        if request.test_connection {
            debug!(resource_type = %tag, "Testing connection before run");
            connector.test_connection(&request.resource_options).await?;
        }
        connector
            .run(&request.resource_options, &request.action_options)
            .await
    }

    async fn run_virtual(
        &self,
        resource_type: ResourceType,
        request: &DispatchRequest,
    ) -> Result<RuntimeResult, SwitchyardError> {
        match resource_type {
            // Transformers run on the client
            ResourceType::Transformer => Ok(RuntimeResult::empty()),
            _ => {
                let client = self.virtual_client.as_ref().ok_or_else(|| {
                    SwitchyardError::Unsupported("no virtual resource service is configured".to_string())
                })?;
                let (agent_id, input) = agent_call(&request.action_options, request.resource_id.as_deref())?;
                client.run_ai_agent(&agent_id, &input).await
            }
        }
    }

    pub fn validate_resource(&self, tag: &str, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        self.connector(tag)?.validate_resource_options(options)
    }

    pub fn validate_action(&self, tag: &str, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        self.connector(tag)?.validate_action_options(options)
    }

    /// Validate the resource options, then probe the connection
    pub async fn test_connection(&self, tag: &str, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let connector = self.connector(tag)?;
        ensure_valid(connector.validate_resource_options(options)?, || {
            SwitchyardError::InvalidResource(format!("{} resource options are invalid", tag))
        })?;
        connector.test_connection(options).await
    }

    /// Validate the resource options, then describe the resource
    pub async fn get_meta_info(&self, tag: &str, options: &Options) -> Result<MetaInfoResult, SwitchyardError> {
        let connector = self.connector(tag)?;
        ensure_valid(connector.validate_resource_options(options)?, || {
            SwitchyardError::InvalidResource(format!("{} resource options are invalid", tag))
        })?;
        connector.get_meta_info(options).await
    }
}

fn ensure_valid<F>(result: ValidateResult, invalid: F) -> Result<(), SwitchyardError>
where
    F: FnOnce() -> SwitchyardError,
{
    if result.valid {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Render a dispatch outcome as the envelope handed to callers
///
/// SQL syntax errors also carry `lineNumber` and `message` in `extra`.
pub fn into_response(result: Result<RuntimeResult, SwitchyardError>) -> ActionResponse {
    match result {
        Ok(result) => ActionResponse::success(result),
        Err(e) => {
            let mut response = ActionResponse::error(e.kind(), e.sanitized_message());
            if let SwitchyardError::SqlSyntax { line_number, message } = &e {
                response.extra.insert("lineNumber".to_string(), json!(line_number));
                response.extra.insert("message".to_string(), json!(message));
            }
            response
        }
    }
}
