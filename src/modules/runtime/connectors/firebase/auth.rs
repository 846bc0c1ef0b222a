//! Firebase Authentication operations over the Identity Toolkit API

use serde::Deserialize;
use serde_json::{json, Map, Value};
use switchyard_core::SwitchyardError;
use switchyard_types::{Row, RuntimeResult};

use super::{decode_options, FirebaseSession};
use crate::connectors::common::flexible_u64;
use crate::connectors::traits::require_action;

const DEFAULT_PAGE_SIZE: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Uid,
    Email,
    Phone,
    Create,
    Update,
    Delete,
    List,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthOptions {
    /// Lookup key: uid, email or phone number depending on the operation
    #[serde(default)]
    filter: String,
    /// User properties for `create` and `update`
    #[serde(default)]
    object: Map<String, Value>,
    #[serde(default, deserialize_with = "flexible_u64")]
    number: Option<u64>,
    #[serde(default)]
    token: String,
}

pub struct Request {
    operation: Operation,
    options: AuthOptions,
}

/// Admin SDK property names to their Identity Toolkit equivalents
fn account_body(object: &Map<String, Value>) -> Map<String, Value> {
    object
        .iter()
        .map(|(key, value)| {
            let key = match key.as_str() {
                "uid" => "localId",
                "photoURL" => "photoUrl",
                other => other,
            };
            (key.to_string(), value.clone())
        })
        .collect()
}

fn single(key: &str, value: Value) -> RuntimeResult {
    let mut row = Row::new();
    row.insert(key.to_string(), value);
    RuntimeResult::single(row)
}

impl Request {
    pub fn decode(operation: Operation, options: &Value) -> Result<Self, SwitchyardError> {
        let options: AuthOptions = decode_options(options)?;
        match operation {
            Operation::Uid | Operation::Email | Operation::Phone | Operation::Delete => {
                require_action(&options.filter, "options.filter")?
            }
            Operation::Update => {
                require_action(&options.filter, "options.filter")?;
                if options.object.is_empty() {
                    return Err(SwitchyardError::InvalidAction(
                        "options.object is required".to_string(),
                    ));
                }
            }
            Operation::Create | Operation::List => {}
        }
        Ok(Self { operation, options })
    }

    async fn lookup(
        &self,
        session: &FirebaseSession<'_>,
        key: &str,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let body = json!({ key: [self.options.filter] });
        let found = session
            .send(
                session
                    .client
                    .post(format!("{}/accounts:lookup", session.identity_project()))
                    .json(&body),
            )
            .await?;
        match found.get("users").and_then(Value::as_array).and_then(|u| u.first()) {
            Some(user) => Ok(single("user", user.clone())),
            None => Err(SwitchyardError::OperationFailed(format!(
                "Firebase: no user with {} {}",
                key, self.options.filter
            ))),
        }
    }

    pub async fn run(&self, session: &FirebaseSession<'_>) -> Result<RuntimeResult, SwitchyardError> {
        let project = session.identity_project();
        let opts = &self.options;
        match self.operation {
            Operation::Uid => self.lookup(session, "localId").await,
            Operation::Email => self.lookup(session, "email").await,
            Operation::Phone => self.lookup(session, "phoneNumber").await,
            Operation::Create => {
                let user = session
                    .send(
                        session
                            .client
                            .post(format!("{}/accounts", project))
                            .json(&account_body(&opts.object)),
                    )
                    .await?;
                Ok(single("user", user))
            }
            Operation::Update => {
                let mut body = account_body(&opts.object);
                body.insert("localId".to_string(), Value::String(opts.filter.clone()));
                let user = session
                    .send(
                        session
                            .client
                            .post(format!("{}/accounts:update", project))
                            .json(&body),
                    )
                    .await?;
                Ok(single("user", user))
            }
            Operation::Delete => {
                session
                    .send(
                        session
                            .client
                            .post(format!("{}/accounts:delete", project))
                            .json(&json!({ "localId": opts.filter })),
                    )
                    .await?;
                Ok(RuntimeResult::empty())
            }
            Operation::List => {
                let page_size = opts.number.filter(|n| *n > 0).unwrap_or(DEFAULT_PAGE_SIZE);
                let mut query = vec![("maxResults", page_size.to_string())];
                if !opts.token.is_empty() {
                    query.push(("nextPageToken", opts.token.clone()));
                }
                let page = session
                    .send(
                        session
                            .client
                            .get(format!("{}/accounts:batchGet", project))
                            .query(&query),
                    )
                    .await?;
                let users = page.get("users").cloned().unwrap_or_else(|| json!([]));
                let next = page.get("nextPageToken").cloned().unwrap_or_else(|| json!(""));

                let mut users_row = Row::new();
                users_row.insert("users".to_string(), users);
                let mut token_row = Row::new();
                token_row.insert("nextPageToken".to_string(), next);
                Ok(RuntimeResult::with_rows(vec![users_row, token_row]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{mocked, options};
    use super::*;
    use crate::connectors::traits::Connector;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_account_body_renames_properties() {
        let object = json!({"uid": "u1", "photoURL": "http://p", "email": "a@b.c"});
        let body = account_body(object.as_object().unwrap());
        assert_eq!(body["localId"], json!("u1"));
        assert_eq!(body["photoUrl"], json!("http://p"));
        assert_eq!(body["email"], json!("a@b.c"));
        assert!(!body.contains_key("uid"));
    }

    #[test]
    fn test_lookup_requires_filter() {
        assert!(matches!(
            Request::decode(Operation::Email, &json!({})),
            Err(SwitchyardError::InvalidAction(m)) if m.contains("options.filter")
        ));
        assert!(Request::decode(Operation::List, &Value::Null).is_ok());
    }

    #[tokio::test]
    async fn test_list_pages_users() {
        let server = MockServer::start().await;
        let (connector, resource) = mocked(&server).await;
        Mock::given(method("GET"))
            .and(path("/projects/demo-project/accounts:batchGet"))
            .and(query_param("maxResults", "2"))
            .and(header("authorization", "Bearer fb-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{"localId": "u1"}, {"localId": "u2"}],
                "nextPageToken": "u2"
            })))
            .mount(&server)
            .await;

        let result = connector
            .run(
                &resource,
                &options(json!({
                    "service": "auth",
                    "operation": "list",
                    "options": {"number": 2, "token": ""}
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0]["users"], json!([{"localId": "u1"}, {"localId": "u2"}]));
        assert_eq!(result.rows[1]["nextPageToken"], json!("u2"));
    }

    #[tokio::test]
    async fn test_email_lookup() {
        let server = MockServer::start().await;
        let (connector, resource) = mocked(&server).await;
        Mock::given(method("POST"))
            .and(path("/projects/demo-project/accounts:lookup"))
            .and(body_json(json!({"email": ["ada@example.com"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{"localId": "u1", "email": "ada@example.com"}]
            })))
            .mount(&server)
            .await;

        let result = connector
            .run(
                &resource,
                &options(json!({
                    "service": "auth",
                    "operation": "email",
                    "options": {"filter": "ada@example.com"}
                })),
            )
            .await
            .unwrap();
        assert_eq!(result.rows[0]["user"]["localId"], json!("u1"));
    }

    #[tokio::test]
    async fn test_delete_returns_empty() {
        let server = MockServer::start().await;
        let (connector, resource) = mocked(&server).await;
        Mock::given(method("POST"))
            .and(path("/projects/demo-project/accounts:delete"))
            .and(body_json(json!({"localId": "u9"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let result = connector
            .run(
                &resource,
                &options(json!({"service": "auth", "operation": "delete", "options": {"filter": "u9"}})),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.rows.is_empty());
    }
}
