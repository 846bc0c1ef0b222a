//! GraphQL connector

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{ConnectionResult, Options, ResourceType, RuntimeResult, ValidateResult};
use tracing::debug;

use super::{send, variables, HttpResource};
use crate::connectors::common::{http_client, transport_error, KeyValue};
use crate::connectors::traits::{decode_action, require_action, require_resource, Connector};

const PROBE_QUERY: &str = "{__typename}";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlAction {
    #[serde(default)]
    query: String,
    /// `{key, value}` list, object, or JSON text
    #[serde(default)]
    variables: Value,
    #[serde(default)]
    url_params: Vec<KeyValue>,
    #[serde(default)]
    headers: Vec<KeyValue>,
    #[serde(default)]
    cookies: Vec<KeyValue>,
}

impl GraphQlAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        require_action(&action.query, "query")?;
        variables(&action.variables)?;
        Ok(action)
    }
}

fn decode_resource(options: &Options) -> Result<HttpResource, SwitchyardError> {
    let resource = HttpResource::decode(options)?;
    require_resource(&resource.base_url, "baseURL")?;
    Ok(resource)
}

/// GraphQL connector
pub struct GraphQlConnector {
    config: Arc<RuntimeConfig>,
}

impl GraphQlConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for GraphQlConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Graphql
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        decode_resource(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        GraphQlAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    /// Sends `{__typename}`, which every schema answers
    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let resource = decode_resource(options)?;
        let request = resource.compose(
            http_client(&self.config)?.post(&resource.base_url),
            &[],
            &[],
            &[],
        );
        let response = request
            .json(&json!({ "query": PROBE_QUERY }))
            .send()
            .await
            .map_err(|e| transport_error("GraphQL", e))?;
        if !response.status().is_success() {
            return Err(SwitchyardError::ConnectFailed(format!(
                "GraphQL probe returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(ConnectionResult::success())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let resource = decode_resource(resource_options)?;
        let action = GraphQlAction::decode(action_options)?;
        debug!(url = %resource.base_url, "GraphQL request");

        let request = resource.compose(
            http_client(&self.config)?.post(&resource.base_url),
            &action.url_params,
            &action.headers,
            &action.cookies,
        );
        let payload = json!({
            "query": action.query,
            "variables": variables(&action.variables)?,
        });
        send("GraphQL", request.json(&payload)).await
    }
}
