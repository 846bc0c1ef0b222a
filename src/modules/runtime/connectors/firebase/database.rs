//! Realtime Database operations over its REST API

use serde::Deserialize;
use serde_json::Value;
use switchyard_core::SwitchyardError;
use switchyard_types::{Row, RuntimeResult};

use super::{decode_options, FirebaseSession};
use crate::connectors::common::{flexible_u64, json_or_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Query,
    Set,
    Update,
    Append,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseOptions {
    /// Path of the node, relative to the database root
    #[serde(default, rename = "ref")]
    reference: String,
    #[serde(default)]
    order_by: String,
    #[serde(default, deserialize_with = "flexible_u64")]
    limit_to_first: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    limit_to_last: Option<u64>,
    #[serde(default)]
    start_at: Option<Value>,
    #[serde(default)]
    end_at: Option<Value>,
    #[serde(default)]
    equal_to: Option<Value>,
    #[serde(default, deserialize_with = "json_or_string")]
    value: Option<Value>,
}

pub struct Request {
    operation: Operation,
    options: DatabaseOptions,
}

/// Rows of a node: an object is one row, an array one row per element
fn node_rows(node: Value) -> Vec<Row> {
    let row_of = |value: Value| -> Row {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            other => {
                let mut row = Row::new();
                row.insert("value".to_string(), other);
                row
            }
        }
    };
    match node {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().filter(|v| !v.is_null()).map(row_of).collect(),
        other => vec![row_of(other)],
    }
}

impl Request {
    pub fn decode(operation: Operation, options: &Value) -> Result<Self, SwitchyardError> {
        let options: DatabaseOptions = decode_options(options)?;
        if operation != Operation::Query && options.value.is_none() {
            return Err(SwitchyardError::InvalidAction(
                "options.value is required".to_string(),
            ));
        }
        Ok(Self { operation, options })
    }

    fn url(&self, database_url: &str) -> String {
        let path = self
            .options
            .reference
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}.json", database_url.trim_end_matches('/'), path)
    }

    /// Query parameters; every value is JSON encoded as the REST API expects
    fn query(&self) -> Vec<(&'static str, String)> {
        let opts = &self.options;
        let mut params = Vec::new();
        if !opts.order_by.is_empty() {
            params.push(("orderBy", Value::String(opts.order_by.clone()).to_string()));
        }
        if let Some(n) = opts.limit_to_first {
            params.push(("limitToFirst", n.to_string()));
        }
        if let Some(n) = opts.limit_to_last {
            params.push(("limitToLast", n.to_string()));
        }
        for (name, bound) in [
            ("startAt", &opts.start_at),
            ("endAt", &opts.end_at),
            ("equalTo", &opts.equal_to),
        ] {
            if let Some(value) = bound {
                params.push((name, value.to_string()));
            }
        }
        params
    }

    pub async fn run(&self, session: &FirebaseSession<'_>) -> Result<RuntimeResult, SwitchyardError> {
        let url = self.url(session.database_url);
        let value = self.options.value.clone().unwrap_or(Value::Null);
        let request = match self.operation {
            Operation::Query => session.client.get(&url).query(&self.query()),
            Operation::Set => session.client.put(&url).json(&value),
            Operation::Update => session.client.patch(&url).json(&value),
            Operation::Append => session.client.post(&url).json(&value),
        };
        let node = session.send(request).await?;
        Ok(RuntimeResult::with_rows(node_rows(node)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{mocked, options};
    use super::*;
    use crate::connectors::traits::Connector;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_query_params_are_json_encoded() {
        let req = Request::decode(
            Operation::Query,
            &json!({"ref": "scores", "orderBy": "$value", "limitToFirst": 3, "startAt": 10, "equalTo": "x"}),
        )
        .unwrap();
        assert_eq!(
            req.query(),
            vec![
                ("orderBy", "\"$value\"".to_string()),
                ("limitToFirst", "3".to_string()),
                ("startAt", "10".to_string()),
                ("equalTo", "\"x\"".to_string()),
            ]
        );
        assert_eq!(req.url("https://db.example.com/"), "https://db.example.com/scores.json");
    }

    #[test]
    fn test_writes_require_value() {
        assert!(matches!(
            Request::decode(Operation::Set, &json!({"ref": "a"})),
            Err(SwitchyardError::InvalidAction(_))
        ));
    }

    #[test]
    fn test_node_rows() {
        assert_eq!(node_rows(json!({"a": 1}))[0]["a"], json!(1));
        assert_eq!(node_rows(json!([null, {"b": 2}, 3])).len(), 2);
        assert_eq!(node_rows(json!(7))[0]["value"], json!(7));
        assert!(node_rows(Value::Null).is_empty());
    }

    #[tokio::test]
    async fn test_query_and_append() {
        let server = MockServer::start().await;
        let (connector, resource) = mocked(&server).await;
        Mock::given(method("GET"))
            .and(path("/users/u1.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ada"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/logs.json"))
            .and(body_json(json!({"msg": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "-Nabc"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/scores.json"))
            .and(query_param("orderBy", "\"$key\""))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(&server)
            .await;

        let read = connector
            .run(
                &resource,
                &options(json!({"service": "database", "operation": "query", "options": {"ref": "users/u1"}})),
            )
            .await
            .unwrap();
        assert_eq!(read.rows[0]["name"], json!("ada"));

        let appended = connector
            .run(
                &resource,
                &options(json!({
                    "service": "database",
                    "operation": "append",
                    "options": {"ref": "logs", "value": "{\"msg\": \"hi\"}"}
                })),
            )
            .await
            .unwrap();
        assert_eq!(appended.rows[0]["name"], json!("-Nabc"));

        let missing = connector
            .run(
                &resource,
                &options(json!({
                    "service": "database",
                    "operation": "query",
                    "options": {"ref": "scores", "orderBy": "$key"}
                })),
            )
            .await
            .unwrap();
        assert!(missing.rows.is_empty());
    }
}
