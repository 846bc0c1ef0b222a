//! Elasticsearch connector over the REST API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{ConnectionResult, Options, ResourceType, Row, RuntimeResult, ValidateResult};
use tracing::debug;

use super::common::{flexible_port, http_client, json_or_string, json_response, transport_error};
use super::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

const DEFAULT_PORT: u16 = 9200;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElasticOptions {
    host: String,
    #[serde(default, deserialize_with = "flexible_port")]
    port: Option<u16>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl ElasticOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.host, "host")?;
        Ok(opts)
    }

    fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        format!("{}:{}", host, self.port.unwrap_or(DEFAULT_PORT))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Search,
    Get,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Deserialize)]
struct ElasticAction {
    operation: Operation,
    #[serde(default)]
    index: String,
    #[serde(default)]
    id: String,
    #[serde(default, deserialize_with = "json_or_string")]
    body: Option<Value>,
    #[serde(default, deserialize_with = "json_or_string")]
    query: Option<Value>,
}

impl ElasticAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        require_action(&action.index, "index")?;
        if matches!(
            action.operation,
            Operation::Get | Operation::Update | Operation::Delete
        ) {
            require_action(&action.id, "id")?;
        }
        Ok(action)
    }
}

/// Flatten a hit into its `_source` plus `_id`
fn hit_to_row(hit: &Value) -> Row {
    let mut row: Row = match hit.get("_source") {
        Some(Value::Object(source)) => source.clone().into_iter().collect(),
        _ => Row::new(),
    };
    if let Some(id) = hit.get("_id") {
        row.insert("_id".to_string(), id.clone());
    }
    row
}

/// Elasticsearch connector
pub struct ElasticsearchConnector {
    config: Arc<RuntimeConfig>,
}

impl ElasticsearchConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for ElasticsearchConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Elasticsearch
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        ElasticOptions::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        ElasticAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    /// Builds the client without contacting the cluster
    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        ElasticOptions::decode(options)?;
        http_client(&self.config)?;
        Ok(ConnectionResult::success())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = ElasticOptions::decode(resource_options)?;
        let action = ElasticAction::decode(action_options)?;
        let client = http_client(&self.config)?;
        let base = opts.base_url();
        let index = urlencoding::encode(&action.index);
        let id = urlencoding::encode(&action.id);

        let request = match action.operation {
            Operation::Search => {
                let body = action
                    .query
                    .clone()
                    .or_else(|| action.body.clone())
                    .unwrap_or_else(|| json!({"query": {"match_all": {}}}));
                client.post(format!("{}/{}/_search", base, index)).json(&body)
            }
            Operation::Get => client.get(format!("{}/{}/_doc/{}", base, index, id)),
            Operation::Insert => {
                let url = if action.id.is_empty() {
                    format!("{}/{}/_doc", base, index)
                } else {
                    format!("{}/{}/_doc/{}", base, index, id)
                };
                client.post(url).json(&action.body.clone().unwrap_or_else(|| json!({})))
            }
            Operation::Update => client
                .post(format!("{}/{}/_update/{}", base, index, id))
                .json(&json!({ "doc": action.body.clone().unwrap_or_else(|| json!({})) })),
            Operation::Delete => client.delete(format!("{}/{}/_doc/{}", base, index, id)),
        };

        let request = if opts.username.is_empty() {
            request
        } else {
            request.basic_auth(&opts.username, Some(&opts.password))
        };

        debug!(operation = ?action.operation, index = %action.index, "Elasticsearch request");
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("Elasticsearch", e))?;
        let body = json_response("Elasticsearch", response).await?;

        let rows = match action.operation {
            Operation::Search => body
                .pointer("/hits/hits")
                .and_then(Value::as_array)
                .map(|hits| hits.iter().map(hit_to_row).collect())
                .unwrap_or_default(),
            Operation::Get => vec![hit_to_row(&body)],
            _ => match body {
                Value::Object(map) => vec![map.into_iter().collect()],
                _ => Vec::new(),
            },
        };
        Ok(RuntimeResult::with_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_base_url() {
        let opts = ElasticOptions::decode(&options(json!({"host": "search.local"}))).unwrap();
        assert_eq!(opts.base_url(), "http://search.local:9200");
    }

    #[test]
    fn test_action_requires_id() {
        let err = ElasticAction::decode(&options(json!({"operation": "get", "index": "docs"})))
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::InvalidAction(m) if m.contains("id")));
    }

    #[tokio::test]
    async fn test_search_flattens_hits() {
        let server = MockServer::start().await;
        let uri = url::Url::parse(&server.uri()).unwrap();
        Mock::given(method("POST"))
            .and(path("/docs/_search"))
            .and(body_json(json!({"query": {"term": {"tag": "a"}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"hits": [
                    {"_id": "1", "_source": {"title": "first"}},
                    {"_id": "2", "_source": {"title": "second"}}
                ]}
            })))
            .mount(&server)
            .await;

        let connector = ElasticsearchConnector::new(Arc::new(RuntimeConfig::default()));
        let resource = options(json!({
            "host": format!("http://{}", uri.host_str().unwrap()),
            "port": uri.port().unwrap()
        }));
        let result = connector
            .run(
                &resource,
                &options(json!({
                    "operation": "search",
                    "index": "docs",
                    "query": "{\"query\": {\"term\": {\"tag\": \"a\"}}}"
                })),
            )
            .await
            .unwrap();

        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0]["_id"], json!("1"));
        assert_eq!(result.rows[1]["title"], json!("second"));
    }
}
