//! CouchDB connector over the HTTP API

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{
    ConnectionResult, MetaInfoResult, Options, ResourceType, Row, RuntimeResult, ValidateResult,
};
use tracing::debug;

use super::common::{
    flexible_bool, flexible_port, http_client, json_or_string, json_response, transport_error,
    value_to_rows,
};
use super::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

const DEFAULT_PORT: u16 = 5984;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CouchOptions {
    host: String,
    #[serde(default, deserialize_with = "flexible_port")]
    port: Option<u16>,
    #[serde(default, deserialize_with = "flexible_bool")]
    ssl: bool,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl CouchOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.host, "host")?;
        Ok(opts)
    }

    fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            return match self.port {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            };
        }
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, host, self.port.unwrap_or(DEFAULT_PORT))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Method {
    ListRecords,
    RetrieveRecord,
    CreateRecord,
    UpdateRecord,
    DeleteRecord,
    Find,
    GetView,
}

#[derive(Debug, Clone, Deserialize)]
struct CouchAction {
    method: Method,
    #[serde(default)]
    database: String,
    #[serde(default, deserialize_with = "json_or_string")]
    opts: Option<Value>,
}

impl CouchAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        require_action(&action.database, "database")?;
        match action.method {
            Method::RetrieveRecord | Method::UpdateRecord | Method::DeleteRecord => {
                require_action(&action.text("id"), "opts.id")?
            }
            Method::GetView => require_action(&action.text("viewUrl"), "opts.viewUrl")?,
            _ => {}
        }
        Ok(action)
    }

    fn opt(&self, name: &str) -> Option<&Value> {
        self.opts.as_ref()?.get(name).filter(|v| !v.is_null())
    }

    fn text(&self, name: &str) -> String {
        match self.opt(name) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// Query parameters shared by `_all_docs` and views; keys are JSON-encoded
    fn view_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(Value::Bool(include)) = self.opt("includeDocs") {
            params.push(("include_docs".to_string(), include.to_string()));
        }
        for (option, param) in [("limit", "limit"), ("skip", "skip")] {
            if let Some(value) = self.opt(option) {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                params.push((param.to_string(), text));
            }
        }
        for (option, param) in [("startKey", "start_key"), ("endKey", "end_key")] {
            if let Some(value) = self.opt(option) {
                params.push((param.to_string(), value.to_string()));
            }
        }
        params
    }

    fn include_docs(&self) -> bool {
        matches!(self.opt("includeDocs"), Some(Value::Bool(true)))
    }
}

/// Rows of an `_all_docs` or view response; `doc` replaces the row when present
fn view_rows(body: &Value, include_docs: bool) -> Vec<Row> {
    body.get("rows")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let source = if include_docs { row.get("doc") } else { Some(row) };
                    match source {
                        Some(Value::Object(map)) => Some(map.clone().into_iter().collect()),
                        _ => None,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// CouchDB connector
pub struct CouchDbConnector {
    config: Arc<RuntimeConfig>,
}

impl CouchDbConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    async fn send(
        opts: &CouchOptions,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, SwitchyardError> {
        let request = if opts.username.is_empty() {
            request
        } else {
            request.basic_auth(&opts.username, Some(&opts.password))
        };
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("CouchDB", e))?;
        json_response("CouchDB", response).await
    }
}

#[async_trait]
impl Connector for CouchDbConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Couchdb
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        CouchOptions::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        CouchAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = CouchOptions::decode(options)?;
        let client = http_client(&self.config)?;
        Self::send(&opts, client.get(format!("{}/", opts.base_url())))
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))?;
        Ok(ConnectionResult::success())
    }

    async fn get_meta_info(&self, options: &Options) -> Result<MetaInfoResult, SwitchyardError> {
        let opts = CouchOptions::decode(options)?;
        let client = http_client(&self.config)?;
        let databases = Self::send(&opts, client.get(format!("{}/_all_dbs", opts.base_url()))).await?;
        Ok(MetaInfoResult::new(HashMap::from([(
            "databases".to_string(),
            databases,
        )])))
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = CouchOptions::decode(resource_options)?;
        let action = CouchAction::decode(action_options)?;
        let client = http_client(&self.config)?;
        let db_url = format!("{}/{}", opts.base_url(), urlencoding::encode(&action.database));
        let id = action.text("id");
        let records = action.opt("records").cloned().unwrap_or_else(|| json!({}));

        debug!(method = ?action.method, database = %action.database, "CouchDB request");
        let rows = match action.method {
            Method::ListRecords => {
                let body = Self::send(
                    &opts,
                    client
                        .get(format!("{}/_all_docs", db_url))
                        .query(&action.view_params()),
                )
                .await?;
                view_rows(&body, action.include_docs())
            }
            Method::RetrieveRecord => value_to_rows(
                Self::send(&opts, client.get(format!("{}/{}", db_url, urlencoding::encode(&id)))).await?,
            ),
            Method::CreateRecord => {
                value_to_rows(Self::send(&opts, client.post(&db_url).json(&records)).await?)
            }
            Method::UpdateRecord => {
                let mut doc = records;
                let rev = action.text("rev");
                if let (Value::Object(map), false) = (&mut doc, rev.is_empty()) {
                    map.insert("_rev".to_string(), Value::String(rev));
                }
                value_to_rows(
                    Self::send(
                        &opts,
                        client
                            .put(format!("{}/{}", db_url, urlencoding::encode(&id)))
                            .json(&doc),
                    )
                    .await?,
                )
            }
            Method::DeleteRecord => value_to_rows(
                Self::send(
                    &opts,
                    client
                        .delete(format!("{}/{}", db_url, urlencoding::encode(&id)))
                        .query(&[("rev", action.text("rev"))]),
                )
                .await?,
            ),
            Method::Find => {
                let query = action
                    .opt("mangoQuery")
                    .cloned()
                    .map(|q| match q {
                        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::Null),
                        other => other,
                    })
                    .filter(Value::is_object)
                    .unwrap_or_else(|| json!({"selector": {}}));
                let body = Self::send(&opts, client.post(format!("{}/_find", db_url)).json(&query)).await?;
                body.get("docs").cloned().map(value_to_rows).unwrap_or_default()
            }
            Method::GetView => {
                let view = action.text("viewUrl");
                let body = Self::send(
                    &opts,
                    client
                        .get(format!("{}/{}", db_url, view.trim_start_matches('/')))
                        .query(&action.view_params()),
                )
                .await?;
                view_rows(&body, action.include_docs())
            }
        };

        Ok(RuntimeResult::with_rows(rows))
    }
}
