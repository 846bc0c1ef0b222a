//! Firestore operations over the REST API

use serde::Deserialize;
use serde_json::{json, Map, Value};
use switchyard_core::SwitchyardError;
use switchyard_types::{Row, RuntimeResult};
use tracing::warn;

use super::value::{field_path, from_fields, to_fields, to_firestore};
use super::{decode_options, FirebaseSession};
use crate::connectors::common::{flexible_bool, flexible_u64, json_or_string};
use crate::connectors::traits::require_action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    QueryFs,
    InsertDoc,
    UpdateDoc,
    GetDoc,
    DeleteDoc,
    GetColls,
    QueryColl,
}

/// A query cursor; `trigger = false` leaves it unset
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cursor {
    #[serde(default, deserialize_with = "flexible_bool")]
    trigger: bool,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirestoreOptions {
    #[serde(default)]
    collection: String,
    #[serde(default)]
    id: String,
    #[serde(default, deserialize_with = "json_or_string")]
    value: Option<Value>,
    #[serde(default, rename = "where")]
    where_clauses: Vec<Value>,
    #[serde(default, deserialize_with = "flexible_u64")]
    limit: Option<u64>,
    #[serde(default)]
    order_by: String,
    #[serde(default)]
    order_direction: String,
    #[serde(default)]
    start_at: Option<Cursor>,
    #[serde(default)]
    end_at: Option<Cursor>,
}

pub struct Request {
    operation: Operation,
    options: FirestoreOptions,
}

fn operator(op: &str) -> Option<&'static str> {
    Some(match op {
        "==" => "EQUAL",
        "!=" => "NOT_EQUAL",
        "<" => "LESS_THAN",
        "<=" => "LESS_THAN_OR_EQUAL",
        ">" => "GREATER_THAN",
        ">=" => "GREATER_THAN_OR_EQUAL",
        "array-contains" => "ARRAY_CONTAINS",
        "in" => "IN",
        "array-contains-any" => "ARRAY_CONTAINS_ANY",
        "not-in" => "NOT_IN",
        _ => return None,
    })
}

/// A `[field, op, value]` triple as a field filter; malformed triples yield `None`
fn field_filter(clause: &Value) -> Option<Value> {
    let parts = clause.as_array().filter(|parts| parts.len() == 3)?;
    let field = parts[0].as_str().filter(|f| !f.is_empty())?;
    let op = operator(parts[1].as_str()?)?;
    Some(json!({"fieldFilter": {
        "field": {"fieldPath": field_path(field)},
        "op": op,
        "value": to_firestore(&parts[2])
    }}))
}

/// Encode each segment of a slash-separated path
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Plain-JSON row of a Firestore document, with its id under `_id`
fn document_row(document: &Value) -> Row {
    let mut row: Row = match document.get("fields").and_then(Value::as_object).map(from_fields) {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => Row::new(),
    };
    if let Some(name) = document.get("name").and_then(Value::as_str) {
        let id = name.rsplit('/').next().unwrap_or(name);
        row.insert("_id".to_string(), Value::String(id.to_string()));
    }
    row
}

impl Request {
    pub fn decode(operation: Operation, options: &Value) -> Result<Self, SwitchyardError> {
        let options: FirestoreOptions = decode_options(options)?;
        match operation {
            Operation::GetColls => {}
            Operation::QueryFs | Operation::QueryColl => {
                require_action(&options.collection, "options.collection")?
            }
            Operation::InsertDoc | Operation::UpdateDoc => {
                require_action(&options.collection, "options.collection")?;
                if operation == Operation::UpdateDoc {
                    require_action(&options.id, "options.id")?;
                }
                if !matches!(options.value, Some(Value::Object(_))) {
                    return Err(SwitchyardError::InvalidAction(
                        "options.value must be an object".to_string(),
                    ));
                }
            }
            Operation::GetDoc | Operation::DeleteDoc => {
                require_action(&options.collection, "options.collection")?;
                require_action(&options.id, "options.id")?;
            }
        }
        Ok(Self { operation, options })
    }

    fn fields(&self) -> Value {
        match &self.options.value {
            Some(Value::Object(map)) => to_fields(map),
            _ => Value::Object(Map::new()),
        }
    }

    /// The `structuredQuery` of a collection or collection-group query
    fn structured_query(&self, collection_id: &str, all_descendants: bool) -> Value {
        let opts = &self.options;
        let mut query = Map::new();
        query.insert(
            "from".to_string(),
            json!([{"collectionId": collection_id, "allDescendants": all_descendants}]),
        );

        let mut filters = Vec::new();
        for clause in &opts.where_clauses {
            match field_filter(clause) {
                Some(filter) => filters.push(filter),
                None => warn!(clause = %clause, "Skipping malformed where clause"),
            }
        }
        match filters.len() {
            0 => {}
            1 => {
                query.insert("where".to_string(), filters.remove(0));
            }
            _ => {
                query.insert(
                    "where".to_string(),
                    json!({"compositeFilter": {"op": "AND", "filters": filters}}),
                );
            }
        }

        if !opts.order_by.is_empty() {
            let direction = if opts.order_direction.eq_ignore_ascii_case("desc") {
                "DESCENDING"
            } else {
                "ASCENDING"
            };
            query.insert(
                "orderBy".to_string(),
                json!([{"field": {"fieldPath": field_path(&opts.order_by)}, "direction": direction}]),
            );
        }
        if let Some(cursor) = opts.start_at.as_ref().filter(|c| c.trigger) {
            query.insert(
                "startAt".to_string(),
                json!({"values": [to_firestore(&cursor.value)], "before": true}),
            );
        }
        if let Some(cursor) = opts.end_at.as_ref().filter(|c| c.trigger) {
            query.insert(
                "endAt".to_string(),
                json!({"values": [to_firestore(&cursor.value)], "before": false}),
            );
        }
        if let Some(limit) = opts.limit.filter(|l| *l > 0) {
            query.insert("limit".to_string(), json!(limit));
        }
        Value::Object(query)
    }

    /// `(parent path, collection id)` of a possibly nested collection path
    fn split_collection(&self) -> (String, String) {
        let path = encode_path(&self.options.collection);
        match path.rsplit_once('/') {
            Some((parent, id)) => (format!("/{}", parent), id.to_string()),
            None => (String::new(), path),
        }
    }

    pub async fn run(&self, session: &FirebaseSession<'_>) -> Result<RuntimeResult, SwitchyardError> {
        let documents = format!("{}/documents", session.firestore_database());
        let opts = &self.options;
        let document_url = || {
            format!(
                "{}/{}/{}",
                documents,
                encode_path(&opts.collection),
                urlencoding::encode(&opts.id)
            )
        };

        match self.operation {
            Operation::QueryFs | Operation::QueryColl => {
                let group = self.operation == Operation::QueryColl;
                let (parent, collection_id) = if group {
                    let id = opts.collection.rsplit('/').next().unwrap_or_default().to_string();
                    (String::new(), id)
                } else {
                    self.split_collection()
                };
                let body = json!({"structuredQuery": self.structured_query(&collection_id, group)});
                let results = session
                    .send(
                        session
                            .client
                            .post(format!("{}{}:runQuery", documents, parent))
                            .json(&body),
                    )
                    .await?;
                let rows = results
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(|item| item.get("document"))
                    .map(document_row)
                    .collect();
                Ok(RuntimeResult::with_rows(rows))
            }
            Operation::InsertDoc => {
                let mut request = session
                    .client
                    .post(format!("{}/{}", documents, encode_path(&opts.collection)))
                    .json(&json!({ "fields": self.fields() }));
                if !opts.id.is_empty() {
                    request = request.query(&[("documentId", opts.id.as_str())]);
                }
                let created = session.send(request).await?;
                Ok(RuntimeResult::single(document_row(&created)))
            }
            Operation::UpdateDoc => {
                let mut params: Vec<(&str, String)> = opts
                    .value
                    .as_ref()
                    .and_then(Value::as_object)
                    .into_iter()
                    .flat_map(|map| map.keys())
                    .map(|key| ("updateMask.fieldPaths", field_path(key)))
                    .collect();
                params.push(("currentDocument.exists", "true".to_string()));
                let updated = session
                    .send(
                        session
                            .client
                            .patch(document_url())
                            .query(&params)
                            .json(&json!({ "fields": self.fields() })),
                    )
                    .await?;
                Ok(RuntimeResult::single(document_row(&updated)))
            }
            Operation::GetDoc => {
                let document = session.send(session.client.get(document_url())).await?;
                Ok(RuntimeResult::single(document_row(&document)))
            }
            Operation::DeleteDoc => {
                session.send(session.client.delete(document_url())).await?;
                Ok(RuntimeResult::empty())
            }
            Operation::GetColls => {
                // `collection/document[/...]` whose sub-collections to list; empty for root
                let parent = encode_path(&opts.collection);
                let url = if parent.is_empty() {
                    format!("{}:listCollectionIds", documents)
                } else {
                    format!("{}/{}:listCollectionIds", documents, parent)
                };
                let mut collections = Vec::new();
                let mut page_token = String::new();
                loop {
                    let body = if page_token.is_empty() {
                        json!({})
                    } else {
                        json!({ "pageToken": page_token })
                    };
                    let page = session.send(session.client.post(&url).json(&body)).await?;
                    if let Some(Value::Array(ids)) = page.get("collectionIds") {
                        collections.extend(ids.iter().cloned());
                    }
                    match page.get("nextPageToken").and_then(Value::as_str) {
                        Some(next) if !next.is_empty() => page_token = next.to_string(),
                        _ => break,
                    }
                }
                let mut row = Row::new();
                row.insert("collections".to_string(), Value::Array(collections));
                Ok(RuntimeResult::single(row))
            }
        }
    }
}
