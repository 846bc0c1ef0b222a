//! Appwrite databases connector

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{
    ConnectionResult, MetaInfoResult, Options, ResourceType, Row, RuntimeResult, ValidateResult,
};
use tracing::{debug, warn};

use super::common::{http_client, json_or_string, json_response, transport_error, value_to_rows};
use super::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

#[derive(Debug, Clone, Deserialize)]
struct AppwriteOptions {
    #[serde(default)]
    host: String,
    #[serde(default, rename = "projectID")]
    project_id: String,
    #[serde(default, rename = "databaseID")]
    database_id: String,
    #[serde(default, rename = "apiKey")]
    api_key: String,
}

impl AppwriteOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.host, "host")?;
        require_resource(&opts.project_id, "projectID")?;
        require_resource(&opts.database_id, "databaseID")?;
        require_resource(&opts.api_key, "apiKey")?;
        Ok(opts)
    }

    /// `<host>/v1/databases/<databaseID>`
    fn database_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let api = if host.ends_with("/v1") {
            host
        } else {
            format!("{}/v1", host)
        };
        format!("{}/databases/{}", api, urlencoding::encode(&self.database_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Method {
    List,
    Get,
    Create,
    Update,
    Delete,
}

/// One `{attribute, operator, value}` list filter
#[derive(Debug, Clone, Deserialize)]
struct Filter {
    #[serde(default)]
    attribute: String,
    #[serde(default)]
    operator: String,
    #[serde(default)]
    value: Value,
}

impl Filter {
    /// Render as an Appwrite query string, `None` when the operator is unknown
    fn to_query(&self) -> Option<String> {
        let attribute = serde_json::to_string(&self.attribute).ok()?;
        let values = match &self.value {
            Value::Array(items) => Value::Array(items.clone()),
            other => Value::Array(vec![other.clone()]),
        };
        let method = match self.operator.as_str() {
            "==" | "equal" => "equal",
            "!=" | "notEqual" => "notEqual",
            "<" | "lessThan" => "lessThan",
            "<=" | "lessThanEqual" => "lessThanEqual",
            ">" | "greaterThan" => "greaterThan",
            ">=" | "greaterThanEqual" => "greaterThanEqual",
            "search" => "search",
            "startsWith" => "startsWith",
            "endsWith" => "endsWith",
            "isNull" => return Some(format!("isNull({})", attribute)),
            "isNotNull" => return Some(format!("isNotNull({})", attribute)),
            _ => return None,
        };
        let rendered = match (method, &self.value) {
            ("search" | "startsWith" | "endsWith", Value::String(s)) => {
                serde_json::to_string(s).ok()?
            }
            _ => values.to_string(),
        };
        Some(format!("{}({}, {})", method, attribute, rendered))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionOpts {
    #[serde(default)]
    id: String,
    #[serde(default, deserialize_with = "json_or_string")]
    data: Option<Value>,
    #[serde(default)]
    filter: Vec<Filter>,
    #[serde(default)]
    limit: Option<u64>,
    #[serde(default)]
    order_by: String,
    #[serde(default)]
    order_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppwriteAction {
    method: Method,
    #[serde(default, rename = "collectionID")]
    collection_id: String,
    #[serde(default)]
    opts: ActionOpts,
}

impl AppwriteAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        require_action(&action.collection_id, "collectionID")?;
        match action.method {
            Method::Get | Method::Update | Method::Delete => {
                require_action(&action.opts.id, "opts.id")?
            }
            Method::Create | Method::List => {}
        }
        if matches!(action.method, Method::Create | Method::Update)
            && !matches!(action.opts.data, Some(Value::Object(_)))
        {
            return Err(SwitchyardError::InvalidAction(
                "opts.data must be an object".to_string(),
            ));
        }
        Ok(action)
    }

    /// Query strings for `list`; unknown filter operators are skipped
    fn queries(&self) -> Vec<String> {
        let mut queries: Vec<String> = self
            .opts
            .filter
            .iter()
            .filter_map(|f| {
                let query = f.to_query();
                if query.is_none() {
                    warn!(operator = %f.operator, "Skipping Appwrite filter with unknown operator");
                }
                query
            })
            .collect();
        if !self.opts.order_by.is_empty() {
            let method = if self.opts.order_type.eq_ignore_ascii_case("desc") {
                "orderDesc"
            } else {
                "orderAsc"
            };
            queries.push(format!("{}({})", method, json!(self.opts.order_by)));
        }
        if let Some(limit) = self.opts.limit.filter(|l| *l > 0) {
            queries.push(format!("limit({})", limit));
        }
        queries
    }
}

/// Appwrite connector
pub struct AppwriteConnector {
    config: Arc<RuntimeConfig>,
}

impl AppwriteConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    async fn send(
        opts: &AppwriteOptions,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, SwitchyardError> {
        let response = request
            .header("X-Appwrite-Project", &opts.project_id)
            .header("X-Appwrite-Key", &opts.api_key)
            .send()
            .await
            .map_err(|e| transport_error("Appwrite", e))?;
        json_response("Appwrite", response).await
    }

    async fn collections(&self, opts: &AppwriteOptions) -> Result<Vec<Value>, SwitchyardError> {
        let client = http_client(&self.config)?;
        let body = Self::send(opts, client.get(format!("{}/collections", opts.database_url()))).await?;
        Ok(body
            .get("collections")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| c.get("$id"))
                    .map(|id| json!({ "id": id }))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl Connector for AppwriteConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Appwrite
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        AppwriteOptions::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        AppwriteAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = AppwriteOptions::decode(options)?;
        self.collections(&opts)
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))?;
        Ok(ConnectionResult::success())
    }

    async fn get_meta_info(&self, options: &Options) -> Result<MetaInfoResult, SwitchyardError> {
        let opts = AppwriteOptions::decode(options)?;
        let collections = self.collections(&opts).await?;
        Ok(MetaInfoResult::new(HashMap::from([(
            "collections".to_string(),
            Value::Array(collections),
        )])))
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = AppwriteOptions::decode(resource_options)?;
        let action = AppwriteAction::decode(action_options)?;
        let client = http_client(&self.config)?;
        let documents = format!(
            "{}/collections/{}/documents",
            opts.database_url(),
            urlencoding::encode(&action.collection_id)
        );
        let document = format!("{}/{}", documents, urlencoding::encode(&action.opts.id));
        let data = action.opts.data.clone().unwrap_or_else(|| json!({}));

        debug!(method = ?action.method, collection = %action.collection_id, "Appwrite request");
        let rows: Vec<Row> = match action.method {
            Method::List => {
                let query: Vec<(&str, String)> = action
                    .queries()
                    .into_iter()
                    .map(|q| ("queries[]", q))
                    .collect();
                let body = Self::send(&opts, client.get(&documents).query(&query)).await?;
                body.get("documents").cloned().map(value_to_rows).unwrap_or_default()
            }
            Method::Get => value_to_rows(Self::send(&opts, client.get(&document)).await?),
            Method::Create => {
                let id = if action.opts.id.is_empty() {
                    "unique()".to_string()
                } else {
                    action.opts.id.clone()
                };
                value_to_rows(
                    Self::send(
                        &opts,
                        client.post(&documents).json(&json!({"documentId": id, "data": data})),
                    )
                    .await?,
                )
            }
            Method::Update => value_to_rows(
                Self::send(&opts, client.patch(&document).json(&json!({ "data": data }))).await?,
            ),
            Method::Delete => {
                Self::send(&opts, client.delete(&document)).await?;
                Vec::new()
            }
        };
        Ok(RuntimeResult::with_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    fn resource(server: &MockServer) -> Options {
        options(json!({
            "host": server.uri(),
            "projectID": "proj",
            "databaseID": "main",
            "apiKey": "secret"
        }))
    }

    #[test]
    fn test_database_url() {
        let opts = AppwriteOptions::decode(&options(json!({
            "host": "cloud.appwrite.io/v1/",
            "projectID": "p",
            "databaseID": "db",
            "apiKey": "k"
        })))
        .unwrap();
        assert_eq!(opts.database_url(), "https://cloud.appwrite.io/v1/databases/db");
    }

    #[test]
    fn test_queries() {
        let action = AppwriteAction::decode(&options(json!({
            "method": "list",
            "collectionID": "books",
            "opts": {
                "filter": [
                    {"attribute": "year", "operator": ">=", "value": 1990},
                    {"attribute": "title", "operator": "startsWith", "value": "The"},
                    {"attribute": "x", "operator": "nonsense", "value": 1}
                ],
                "orderBy": "year",
                "orderType": "desc",
                "limit": 5
            }
        })))
        .unwrap();
        assert_eq!(
            action.queries(),
            vec![
                "greaterThanEqual(\"year\", [1990])",
                "startsWith(\"title\", \"The\")",
                "orderDesc(\"year\")",
                "limit(5)",
            ]
        );
    }

    #[test]
    fn test_update_requires_data() {
        assert!(matches!(
            AppwriteAction::decode(&options(json!({
                "method": "update",
                "collectionID": "books",
                "opts": {"id": "b1"}
            }))),
            Err(SwitchyardError::InvalidAction(m)) if m.contains("data")
        ));
    }

    #[tokio::test]
    async fn test_meta_lists_collection_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/main/collections"))
            .and(header("X-Appwrite-Project", "proj"))
            .and(header("X-Appwrite-Key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 2,
                "collections": [{"$id": "books", "name": "Books"}, {"$id": "authors"}]
            })))
            .mount(&server)
            .await;

        let connector = AppwriteConnector::new(Arc::new(RuntimeConfig::default()));
        let meta = connector.get_meta_info(&resource(&server)).await.unwrap();
        assert_eq!(
            meta.schema["collections"],
            json!([{"id": "books"}, {"id": "authors"}])
        );
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/databases/main/collections/books/documents"))
            .and(body_json(json!({"documentId": "unique()", "data": {"title": "Dune"}})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"$id": "d1", "title": "Dune"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/databases/main/collections/books/documents"))
            .and(query_param("queries[]", "limit(1)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total": 1,
                "documents": [{"$id": "d1", "title": "Dune"}]
            })))
            .mount(&server)
            .await;

        let connector = AppwriteConnector::new(Arc::new(RuntimeConfig::default()));
        let created = connector
            .run(
                &resource(&server),
                &options(json!({
                    "method": "create",
                    "collectionID": "books",
                    "opts": {"data": {"title": "Dune"}}
                })),
            )
            .await
            .unwrap();
        assert_eq!(created.rows[0]["$id"], json!("d1"));

        let listed = connector
            .run(
                &resource(&server),
                &options(json!({"method": "list", "collectionID": "books", "opts": {"limit": 1}})),
            )
            .await
            .unwrap();
        assert_eq!(listed.rows.len(), 1);
        assert_eq!(listed.rows[0]["title"], json!("Dune"));
    }
}
