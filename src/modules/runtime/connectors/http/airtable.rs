//! Airtable connector over the Web API

use async_trait::async_trait;
use reqwest::Method as M;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{ConnectionResult, Options, ResourceType, Row, RuntimeResult, ValidateResult};
use tracing::debug;

use crate::connectors::common::{
    flexible_bool, flexible_u64, http_client, json_response, transport_error, value_to_rows,
};
use crate::connectors::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

#[derive(Debug, Clone, Default, Deserialize)]
struct AuthenticationConfig {
    #[serde(default)]
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AirtableOptions {
    /// `personalToken` or the legacy `apiKey`; both are sent as bearer tokens
    #[serde(default)]
    authentication_type: String,
    #[serde(default)]
    authentication_config: AuthenticationConfig,
}

impl AirtableOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        match opts.authentication_type.as_str() {
            "" | "personalToken" | "apiKey" => {}
            other => {
                return Err(SwitchyardError::InvalidResource(format!(
                    "unknown authenticationType {}",
                    other
                )))
            }
        }
        require_resource(&opts.authentication_config.token, "authenticationConfig.token")?;
        Ok(opts)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SortField {
    field: String,
    #[serde(default)]
    direction: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListConfig {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    filter_by_formula: String,
    #[serde(default, deserialize_with = "flexible_u64")]
    max_records: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    page_size: Option<u64>,
    #[serde(default)]
    sort: Vec<SortField>,
    #[serde(default)]
    view: String,
    #[serde(default)]
    cell_format: String,
    #[serde(default)]
    time_zone: String,
    #[serde(default)]
    user_locale: String,
    #[serde(default)]
    offset: String,
}

impl ListConfig {
    fn query(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self
            .fields
            .iter()
            .map(|field| ("fields[]".to_string(), field.clone()))
            .collect();
        for (name, value) in [
            ("filterByFormula", &self.filter_by_formula),
            ("view", &self.view),
            ("cellFormat", &self.cell_format),
            ("timeZone", &self.time_zone),
            ("userLocale", &self.user_locale),
            ("offset", &self.offset),
        ] {
            if !value.is_empty() {
                params.push((name.to_string(), value.clone()));
            }
        }
        if let Some(n) = self.max_records {
            params.push(("maxRecords".to_string(), n.to_string()));
        }
        if let Some(n) = self.page_size {
            params.push(("pageSize".to_string(), n.to_string()));
        }
        for (i, sort) in self.sort.iter().enumerate() {
            params.push((format!("sort[{}][field]", i), sort.field.clone()));
            if !sort.direction.is_empty() {
                params.push((format!("sort[{}][direction]", i), sort.direction.clone()));
            }
        }
        params
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordConfig {
    #[serde(default, rename = "recordID")]
    record_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteConfig {
    #[serde(default, rename = "recordID")]
    record_id: String,
    /// Field maps for `create`, `{id, fields}` records for `bulkUpdate`
    #[serde(default)]
    records: Vec<Value>,
    /// Field map for `update`
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default, deserialize_with = "flexible_bool")]
    typecast: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkDeleteConfig {
    #[serde(default, rename = "recordIDs")]
    record_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", content = "config", rename_all = "camelCase")]
enum AirtableMethod {
    List(ListConfig),
    Get(RecordConfig),
    Create(WriteConfig),
    Update(WriteConfig),
    BulkUpdate(WriteConfig),
    Delete(RecordConfig),
    BulkDelete(BulkDeleteConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AirtableAction {
    #[serde(rename = "baseID")]
    base_id: String,
    table_name: String,
    #[serde(flatten)]
    method: AirtableMethod,
}

impl AirtableAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let mut options = options.clone();
        options
            .entry("config")
            .or_insert_with(|| Value::Object(Map::new()));
        let action: Self = decode_action(&options)?;
        require_action(&action.base_id, "baseID")?;
        require_action(&action.table_name, "tableName")?;
        match &action.method {
            AirtableMethod::Get(c) | AirtableMethod::Delete(c) => {
                require_action(&c.record_id, "config.recordID")?
            }
            AirtableMethod::Update(c) => require_action(&c.record_id, "config.recordID")?,
            AirtableMethod::Create(c) | AirtableMethod::BulkUpdate(c) if c.records.is_empty() => {
                return Err(SwitchyardError::InvalidAction(
                    "config.records must not be empty".to_string(),
                ))
            }
            AirtableMethod::BulkDelete(c) if c.record_ids.is_empty() => {
                return Err(SwitchyardError::InvalidAction(
                    "config.recordIDs must not be empty".to_string(),
                ))
            }
            _ => {}
        }
        Ok(action)
    }
}

/// Records of a response, each one row
fn record_rows(body: Value) -> Vec<Row> {
    match body.get("records") {
        Some(records) => value_to_rows(records.clone()),
        None => value_to_rows(body),
    }
}

/// Airtable connector
pub struct AirtableConnector {
    config: Arc<RuntimeConfig>,
}

impl AirtableConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    async fn call(
        &self,
        token: &str,
        method: reqwest::Method,
        url: String,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Value, SwitchyardError> {
        debug!(method = %method, url = %url, "Airtable request");
        let mut request = http_client(&self.config)?
            .request(method, url)
            .bearer_auth(token)
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| transport_error("Airtable", e))?;
        json_response("Airtable", response).await
    }
}

#[async_trait]
impl Connector for AirtableConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Airtable
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        AirtableOptions::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        AirtableAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    /// Asks `meta/whoami` who the token belongs to
    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = AirtableOptions::decode(options)?;
        let url = format!("{}/meta/whoami", self.config.endpoints.airtable().trim_end_matches('/'));
        self.call(&opts.authentication_config.token, reqwest::Method::GET, url, &[], None)
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))?;
        Ok(ConnectionResult::success())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = AirtableOptions::decode(resource_options)?;
        let action = AirtableAction::decode(action_options)?;
        let token = opts.authentication_config.token.as_str();
        let table = format!(
            "{}/{}/{}",
            self.config.endpoints.airtable().trim_end_matches('/'),
            urlencoding::encode(&action.base_id),
            urlencoding::encode(&action.table_name)
        );
        let record = |id: &str| format!("{}/{}", table, urlencoding::encode(id));

        match &action.method {
            AirtableMethod::List(list) => {
                let body = self.call(token, M::GET, table.clone(), &list.query(), None).await?;
                let mut result = RuntimeResult::with_rows(record_rows(body.clone()));
                if let Some(offset) = body.get("offset") {
                    result = result.with_extra("offset", offset.clone());
                }
                Ok(result)
            }
            AirtableMethod::Get(c) => {
                let body = self.call(token, M::GET, record(&c.record_id), &[], None).await?;
                Ok(RuntimeResult::with_rows(value_to_rows(body)))
            }
            AirtableMethod::Create(c) => {
                let records: Vec<Value> = c
                    .records
                    .iter()
                    .map(|fields| json!({ "fields": fields }))
                    .collect();
                let body = json!({"records": records, "typecast": c.typecast});
                let created = self.call(token, M::POST, table.clone(), &[], Some(body)).await?;
                Ok(RuntimeResult::with_rows(record_rows(created)))
            }
            AirtableMethod::Update(c) => {
                let body = json!({"fields": c.fields, "typecast": c.typecast});
                let updated = self
                    .call(token, M::PATCH, record(&c.record_id), &[], Some(body))
                    .await?;
                Ok(RuntimeResult::with_rows(value_to_rows(updated)))
            }
            AirtableMethod::BulkUpdate(c) => {
                let body = json!({"records": c.records, "typecast": c.typecast});
                let updated = self.call(token, M::PATCH, table.clone(), &[], Some(body)).await?;
                Ok(RuntimeResult::with_rows(record_rows(updated)))
            }
            AirtableMethod::Delete(c) => {
                let deleted = self.call(token, M::DELETE, record(&c.record_id), &[], None).await?;
                Ok(RuntimeResult::with_rows(value_to_rows(deleted)))
            }
            AirtableMethod::BulkDelete(c) => {
                let query: Vec<(String, String)> = c
                    .record_ids
                    .iter()
                    .map(|id| ("records[]".to_string(), id.clone()))
                    .collect();
                let deleted = self.call(token, M::DELETE, table.clone(), &query, None).await?;
                Ok(RuntimeResult::with_rows(record_rows(deleted)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::EndpointConfig;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    fn resource() -> Options {
        options(json!({
            "authenticationType": "personalToken",
            "authenticationConfig": {"token": "pat123"}
        }))
    }

    fn mocked(server: &MockServer) -> AirtableConnector {
        AirtableConnector::new(Arc::new(RuntimeConfig {
            endpoints: EndpointConfig {
                airtable: Some(format!("{}/v0", server.uri())),
                ..EndpointConfig::default()
            },
            ..RuntimeConfig::default()
        }))
    }

    #[test]
    fn test_list_query() {
        let config: ListConfig = serde_json::from_value(json!({
            "fields": ["Name", "Age"],
            "maxRecords": "10",
            "sort": [{"field": "Age", "direction": "desc"}],
            "view": "Grid"
        }))
        .unwrap();
        assert_eq!(
            config.query(),
            vec![
                ("fields[]".to_string(), "Name".to_string()),
                ("fields[]".to_string(), "Age".to_string()),
                ("view".to_string(), "Grid".to_string()),
                ("maxRecords".to_string(), "10".to_string()),
                ("sort[0][field]".to_string(), "Age".to_string()),
                ("sort[0][direction]".to_string(), "desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_action_validation() {
        let connector = AirtableConnector::new(Arc::new(RuntimeConfig::default()));
        assert!(connector
            .validate_action_options(&options(json!({
                "baseID": "app1", "tableName": "People", "method": "list"
            })))
            .is_ok());
        assert!(matches!(
            connector.validate_action_options(&options(json!({
                "baseID": "app1", "tableName": "People", "method": "get", "config": {}
            }))),
            Err(SwitchyardError::InvalidAction(m)) if m.contains("recordID")
        ));
        assert!(matches!(
            connector.validate_resource_options(&options(json!({"authenticationType": "oauth"}))),
            Err(SwitchyardError::InvalidResource(_))
        ));
    }

    #[tokio::test]
    async fn test_list_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v0/app1/People"))
            .and(query_param("pageSize", "2"))
            .and(header("authorization", "Bearer pat123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [
                    {"id": "rec1", "fields": {"Name": "Ada"}},
                    {"id": "rec2", "fields": {"Name": "Grace"}}
                ],
                "offset": "itr2"
            })))
            .mount(&server)
            .await;

        let result = mocked(&server)
            .run(
                &resource(),
                &options(json!({
                    "baseID": "app1", "tableName": "People",
                    "method": "list", "config": {"pageSize": 2}
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[1]["id"], json!("rec2"));
        assert_eq!(result.extra["offset"], json!("itr2"));
    }

    #[tokio::test]
    async fn test_create_wraps_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v0/app1/People"))
            .and(body_json(json!({
                "records": [{"fields": {"Name": "Linus"}}],
                "typecast": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "records": [{"id": "rec3", "fields": {"Name": "Linus"}}]
            })))
            .mount(&server)
            .await;

        let result = mocked(&server)
            .run(
                &resource(),
                &options(json!({
                    "baseID": "app1", "tableName": "People",
                    "method": "create", "config": {"records": [{"Name": "Linus"}]}
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.rows[0]["id"], json!("rec3"));
    }

    #[tokio::test]
    async fn test_api_error_fails_operation() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "NOT_FOUND"})))
            .mount(&server)
            .await;

        let result = mocked(&server)
            .run(
                &resource(),
                &options(json!({
                    "baseID": "app1", "tableName": "People",
                    "method": "delete", "config": {"recordID": "recX"}
                })),
            )
            .await;
        assert!(matches!(result, Err(SwitchyardError::OperationFailed(m)) if m.contains("404")));
    }
}
