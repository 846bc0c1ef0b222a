//! HuggingFace Inference API and Inference Endpoint connectors

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, ResourceType, RuntimeResult, ValidateResult};
use tracing::debug;

use super::{join_url, send, variables, Authentication, HttpResource};
use crate::connectors::common::{flexible_bool, http_client};
use crate::connectors::traits::{decode_action, require_action, require_resource, Connector};

/// Generation and classification parameters; only keys the action sets are forwarded
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all(deserialize = "camelCase", serialize = "snake_case"))]
struct DetailParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    top_k: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repetition_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_new_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    return_full_text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    num_return_sequences: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    do_sample: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    candidate_labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    multi_label: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aggregation_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    use_cache: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wait_for_model: Option<bool>,
}

impl DetailParams {
    /// Split into the API's `parameters` and `options` objects
    fn split(&self) -> Result<(Map<String, Value>, Map<String, Value>), SwitchyardError> {
        let mut parameters = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut options = Map::new();
        for key in ["use_cache", "wait_for_model"] {
            if let Some(value) = parameters.remove(key) {
                options.insert(key.to_string(), value);
            }
        }
        Ok((parameters, options))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum InputType {
    Pairs,
    #[default]
    Text,
    Json,
    Binary,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Inputs {
    #[serde(default, rename = "type")]
    kind: InputType,
    #[serde(default)]
    content: Value,
}

/// What goes on the wire for one inference call
#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Json(Value),
    Binary(Vec<u8>),
}

impl Inputs {
    fn payload_inputs(&self) -> Result<Payload, SwitchyardError> {
        let invalid = |what: &str, e: String| SwitchyardError::InvalidAction(format!("inputs {}: {}", what, e));
        Ok(match self.kind {
            InputType::Text => Payload::Json(match &self.content {
                Value::String(s) => Value::String(s.clone()),
                Value::Null => Value::String(String::new()),
                other => Value::String(other.to_string()),
            }),
            InputType::Pairs => Payload::Json(Value::Object(variables(&self.content)?)),
            InputType::Json => Payload::Json(match &self.content {
                Value::String(s) => {
                    serde_json::from_str(s).map_err(|e| invalid("json", e.to_string()))?
                }
                other => other.clone(),
            }),
            InputType::Binary => {
                let text = self.content.as_str().unwrap_or_default();
                Payload::Binary(
                    STANDARD
                        .decode(text.trim())
                        .map_err(|e| invalid("binary", e.to_string()))?,
                )
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InferenceAction {
    #[serde(default, rename = "modelID")]
    model_id: String,
    #[serde(default)]
    inputs: Inputs,
    #[serde(default, deserialize_with = "flexible_bool")]
    with_detail_params: bool,
    #[serde(default)]
    detail_params: DetailParams,
}

impl InferenceAction {
    fn decode(options: &Options, needs_model: bool) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        if needs_model {
            require_action(&action.model_id, "modelID")?;
        }
        action.payload()?;
        Ok(action)
    }

    fn payload(&self) -> Result<Payload, SwitchyardError> {
        let inputs = match self.inputs.payload_inputs()? {
            Payload::Json(inputs) => inputs,
            binary => return Ok(binary),
        };
        let mut body = Map::new();
        body.insert("inputs".to_string(), inputs);
        if self.with_detail_params {
            let (parameters, options) = self.detail_params.split()?;
            if !parameters.is_empty() {
                body.insert("parameters".to_string(), Value::Object(parameters));
            }
            if !options.is_empty() {
                body.insert("options".to_string(), Value::Object(options));
            }
        }
        Ok(Payload::Json(Value::Object(body)))
    }
}

/// Inference requires a bearer token
fn decode_resource(options: &Options, needs_url: bool) -> Result<HttpResource, SwitchyardError> {
    let resource = HttpResource::decode(options)?;
    if resource.authentication != Authentication::Bearer {
        return Err(SwitchyardError::InvalidResource(
            "authentication error: a bearer token is required".to_string(),
        ));
    }
    if needs_url {
        require_resource(&resource.base_url, "baseURL")?;
    }
    Ok(resource)
}

async fn infer(
    config: &RuntimeConfig,
    resource: &HttpResource,
    url: &str,
    action: &InferenceAction,
) -> Result<RuntimeResult, SwitchyardError> {
    debug!(url = %url, "Inference request");
    let request = resource.authorize(http_client(config)?.post(url));
    let request = match action.payload()? {
        Payload::Json(body) => request.json(&body),
        Payload::Binary(bytes) => request
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes),
    };
    send("HuggingFace", request).await
}

/// HuggingFace Inference API connector; the model is chosen per action
pub struct HuggingFaceConnector {
    config: Arc<RuntimeConfig>,
}

impl HuggingFaceConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for HuggingFaceConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Huggingface
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        decode_resource(options, false)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        InferenceAction::decode(options, true)?;
        Ok(ValidateResult::valid())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let resource = decode_resource(resource_options, false)?;
        let action = InferenceAction::decode(action_options, true)?;
        let url = join_url(self.config.endpoints.huggingface(), &action.model_id);
        infer(&self.config, &resource, &url, &action).await
    }
}

/// Dedicated Inference Endpoint connector; the resource's `baseURL` is the model
pub struct HfEndpointConnector {
    config: Arc<RuntimeConfig>,
}

impl HfEndpointConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for HfEndpointConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::HfEndpoint
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        decode_resource(options, true)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        InferenceAction::decode(options, false)?;
        Ok(ValidateResult::valid())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let resource = decode_resource(resource_options, true)?;
        let action = InferenceAction::decode(action_options, false)?;
        infer(&self.config, &resource, &resource.base_url, &action).await
    }
}
