//! Client for resource types executed by an external service

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, Row, RuntimeResult};
use tracing::debug;

use crate::connectors::common::{http_client, json_response, transport_error};

/// Executes `aiagent` actions on the virtual-resource service
#[async_trait]
pub trait VirtualResourceClient: Send + Sync {
    async fn run_ai_agent(&self, agent_id: &str, input: &Value) -> Result<RuntimeResult, SwitchyardError>;
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    #[serde(default)]
    payload: Value,
}

/// HTTP implementation posting to the configured ai-agent endpoint
#[derive(Debug, Clone)]
pub struct HttpVirtualResourceClient {
    url: String,
    token: String,
    config: RuntimeConfig,
}

impl HttpVirtualResourceClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>, config: RuntimeConfig) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            config,
        }
    }

    /// A client for the configured endpoint, if one is configured
    pub fn from_config(config: &RuntimeConfig) -> Option<Self> {
        let url = config.endpoints.aiagent.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        let token = config.endpoints.aiagent_token.clone().unwrap_or_default();
        Some(Self::new(url, token, config.clone()))
    }
}

#[async_trait]
impl VirtualResourceClient for HttpVirtualResourceClient {
    async fn run_ai_agent(&self, agent_id: &str, input: &Value) -> Result<RuntimeResult, SwitchyardError> {
        debug!(agent_id = %agent_id, "Running AI agent");
        let response = http_client(&self.config)?
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&json!({ "aiAgentID": agent_id, "input": input }))
            .send()
            .await
            .map_err(|e| transport_error("AI agent", e))?;
        let body: AgentResponse = serde_json::from_value(json_response("AI agent", response).await?)
            .map_err(|e| SwitchyardError::OperationFailed(format!("AI agent: {}", e)))?;

        let mut row = Row::new();
        row.insert("payload".to_string(), body.payload);
        Ok(RuntimeResult::single(row))
    }
}

/// `(agent id, input)` of an `aiagent` action template
///
/// The id comes from `aiAgentID`, falling back to the dispatch's resource id;
/// the input is `input` when present, otherwise the whole template.
pub fn agent_call(template: &Options, resource_id: Option<&str>) -> Result<(String, Value), SwitchyardError> {
    let agent_id = template
        .get("aiAgentID")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .or(resource_id)
        .ok_or_else(|| SwitchyardError::InvalidAction("aiAgentID is required".to_string()))?;
    let input = template
        .get("input")
        .cloned()
        .unwrap_or_else(|| Value::Object(template.clone()));
    Ok((agent_id.to_string(), input))
}
