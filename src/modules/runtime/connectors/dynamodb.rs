//! DynamoDB connector over the JSON protocol
//!
//! Action parameters use the API's own field names (`KeyConditionExpression`,
//! `ExpressionAttributeValues`, ...) but carry plain JSON values; attribute
//! values are marshalled on the way in and unmarshalled on the way out.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{
    ConnectionResult, MetaInfoResult, Options, ResourceType, Row, RuntimeResult, ValidateResult,
};
use tracing::debug;

use super::aws::{sign, AwsCredentials, SigningRequest};
use super::common::{flexible_bool, http_client, json_or_string, json_response, transport_error};
use super::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

const SERVICE: &str = "dynamodb";
const TARGET_PREFIX: &str = "DynamoDB_20120810";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Parameters whose values are attribute maps
const ITEM_PARAMETERS: &[&str] = &["Item", "Key", "ExclusiveStartKey"];

#[derive(Debug, Clone, Deserialize)]
struct DynamoOptions {
    #[serde(default)]
    region: String,
    #[serde(default, rename = "accessKeyID")]
    access_key_id: String,
    #[serde(default, rename = "secretAccessKey")]
    secret_access_key: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    endpoint: bool,
    #[serde(default, rename = "baseURL")]
    base_url: String,
}

impl DynamoOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.region, "region")?;
        require_resource(&opts.access_key_id, "accessKeyID")?;
        require_resource(&opts.secret_access_key, "secretAccessKey")?;
        if opts.endpoint {
            require_resource(&opts.base_url, "baseURL")?;
        }
        Ok(opts)
    }

    fn url(&self) -> Result<url::Url, SwitchyardError> {
        let raw = if self.endpoint {
            self.base_url.clone()
        } else {
            format!("https://dynamodb.{}.amazonaws.com/", self.region)
        };
        url::Url::parse(&raw).map_err(|e| SwitchyardError::InvalidResource(format!("baseURL: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Method {
    Query,
    Scan,
    GetItem,
    PutItem,
    UpdateItem,
    DeleteItem,
}

impl Method {
    fn target(&self) -> &'static str {
        match self {
            Method::Query => "Query",
            Method::Scan => "Scan",
            Method::GetItem => "GetItem",
            Method::PutItem => "PutItem",
            Method::UpdateItem => "UpdateItem",
            Method::DeleteItem => "DeleteItem",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DynamoAction {
    method: Method,
    #[serde(default)]
    table: String,
    #[serde(default, deserialize_with = "json_or_string")]
    parameters: Option<Value>,
}

impl DynamoAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        require_action(&action.table, "table")?;
        if !matches!(action.parameters, None | Some(Value::Object(_))) {
            return Err(SwitchyardError::InvalidAction(
                "parameters must be an object".to_string(),
            ));
        }
        let has = |name: &str| {
            action
                .parameters
                .as_ref()
                .and_then(|p| p.get(name))
                .is_some_and(|v| !v.is_null())
        };
        match action.method {
            Method::Query if !has("KeyConditionExpression") => Err(SwitchyardError::InvalidAction(
                "parameters.KeyConditionExpression is required".to_string(),
            )),
            Method::GetItem | Method::UpdateItem | Method::DeleteItem if !has("Key") => Err(
                SwitchyardError::InvalidAction("parameters.Key is required".to_string()),
            ),
            Method::PutItem if !has("Item") => Err(SwitchyardError::InvalidAction(
                "parameters.Item is required".to_string(),
            )),
            _ => Ok(action),
        }
    }

    /// Request body: the parameters with `TableName` set and attribute values marshalled
    fn request_body(&self) -> Value {
        let mut body = match &self.parameters {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        for name in ITEM_PARAMETERS {
            if let Some(Value::Object(item)) = body.get(*name) {
                let marshalled = marshal_item(item);
                body.insert(name.to_string(), marshalled);
            }
        }
        if let Some(Value::Object(values)) = body.get("ExpressionAttributeValues") {
            let marshalled = marshal_item(values);
            body.insert("ExpressionAttributeValues".to_string(), marshalled);
        }
        body.insert("TableName".to_string(), Value::String(self.table.clone()));
        Value::Object(body)
    }
}

/// Plain JSON to a DynamoDB attribute value
pub fn marshal(value: &Value) -> Value {
    match value {
        Value::Null => json!({"NULL": true}),
        Value::Bool(b) => json!({"BOOL": b}),
        Value::Number(n) => json!({"N": n.to_string()}),
        Value::String(s) => json!({"S": s}),
        Value::Array(items) => json!({"L": items.iter().map(marshal).collect::<Vec<_>>()}),
        Value::Object(map) => json!({"M": marshal_item(map)}),
    }
}

fn marshal_item(map: &Map<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), marshal(v))).collect())
}

/// A DynamoDB attribute value to plain JSON; unknown shapes pass through
pub fn unmarshal(value: &Value) -> Value {
    let Some(map) = value.as_object().filter(|m| m.len() == 1) else {
        return value.clone();
    };
    let Some((tag, inner)) = map.iter().next() else {
        return value.clone();
    };
    match (tag.as_str(), inner) {
        ("S", Value::String(s)) | ("B", Value::String(s)) => Value::String(s.clone()),
        ("N", Value::String(n)) => parse_number(n),
        ("BOOL", Value::Bool(b)) => Value::Bool(*b),
        ("NULL", _) => Value::Null,
        ("L", Value::Array(items)) => Value::Array(items.iter().map(unmarshal).collect()),
        ("M", Value::Object(fields)) => unmarshal_item(fields),
        ("SS", Value::Array(items)) | ("BS", Value::Array(items)) => Value::Array(items.clone()),
        ("NS", Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|n| n.as_str().map(parse_number).unwrap_or_else(|| n.clone()))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn unmarshal_item(fields: &Map<String, Value>) -> Value {
    Value::Object(fields.iter().map(|(k, v)| (k.clone(), unmarshal(v))).collect())
}

fn parse_number(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::Number(i.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

fn item_to_row(item: &Value) -> Option<Row> {
    match unmarshal(&json!({"M": item})) {
        Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}

/// DynamoDB connector
pub struct DynamoDbConnector {
    config: Arc<RuntimeConfig>,
}

impl DynamoDbConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    async fn call(
        &self,
        opts: &DynamoOptions,
        operation: &str,
        body: &Value,
    ) -> Result<Value, SwitchyardError> {
        let url = opts.url()?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(SwitchyardError::InvalidResource(
                    "baseURL has no host".to_string(),
                ))
            }
        };
        let payload = serde_json::to_vec(body)?;
        let target = format!("{}.{}", TARGET_PREFIX, operation);
        let extra_headers = vec![
            ("content-type".to_string(), CONTENT_TYPE.to_string()),
            ("x-amz-target".to_string(), target),
        ];
        let signed = sign(
            &AwsCredentials {
                access_key_id: opts.access_key_id.clone(),
                secret_access_key: opts.secret_access_key.clone(),
            },
            &opts.region,
            SERVICE,
            &SigningRequest {
                method: "POST",
                host: &host,
                path: url.path(),
                query: &[],
                headers: &extra_headers,
                payload: &payload,
            },
            Utc::now(),
        )?;

        let mut request = http_client(&self.config)?.post(url.as_str());
        for (name, value) in signed {
            request = request.header(name, value);
        }
        debug!(operation = %operation, "DynamoDB request");
        let response = request
            .body(payload)
            .send()
            .await
            .map_err(|e| transport_error("DynamoDB", e))?;
        json_response("DynamoDB", response).await
    }

    async fn list_tables(&self, opts: &DynamoOptions) -> Result<Vec<Value>, SwitchyardError> {
        let mut tables = Vec::new();
        let mut start: Option<Value> = None;
        loop {
            let body = match &start {
                Some(name) => json!({"ExclusiveStartTableName": name}),
                None => json!({}),
            };
            let page = self.call(opts, "ListTables", &body).await?;
            if let Some(Value::Array(names)) = page.get("TableNames") {
                tables.extend(names.iter().cloned());
            }
            match page.get("LastEvaluatedTableName") {
                Some(next) if !next.is_null() => start = Some(next.clone()),
                _ => return Ok(tables),
            }
        }
    }
}

#[async_trait]
impl Connector for DynamoDbConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Dynamodb
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        DynamoOptions::decode(options)?.url()?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        DynamoAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = DynamoOptions::decode(options)?;
        self.call(&opts, "ListTables", &json!({"Limit": 1}))
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))?;
        Ok(ConnectionResult::success())
    }

    async fn get_meta_info(&self, options: &Options) -> Result<MetaInfoResult, SwitchyardError> {
        let opts = DynamoOptions::decode(options)?;
        let tables = self.list_tables(&opts).await?;
        Ok(MetaInfoResult::new(HashMap::from([(
            "tables".to_string(),
            Value::Array(tables),
        )])))
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = DynamoOptions::decode(resource_options)?;
        let action = DynamoAction::decode(action_options)?;
        let response = self
            .call(&opts, action.method.target(), &action.request_body())
            .await?;

        let result = match action.method {
            Method::Query | Method::Scan => {
                let rows = response
                    .get("Items")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(item_to_row).collect())
                    .unwrap_or_default();
                let mut result = RuntimeResult::with_rows(rows);
                if let Some(count) = response.get("Count") {
                    result = result.with_extra("count", count.clone());
                }
                if let Some(key) = response.get("LastEvaluatedKey") {
                    result = result.with_extra("lastEvaluatedKey", unmarshal(&json!({"M": key})));
                }
                result
            }
            Method::GetItem => match response.get("Item").and_then(item_to_row) {
                Some(row) => RuntimeResult::single(row),
                None => RuntimeResult::empty(),
            },
            Method::PutItem | Method::UpdateItem | Method::DeleteItem => {
                match response.get("Attributes").and_then(item_to_row) {
                    Some(row) => RuntimeResult::single(row),
                    None => RuntimeResult::empty(),
                }
            }
        };
        Ok(result)
    }
}
