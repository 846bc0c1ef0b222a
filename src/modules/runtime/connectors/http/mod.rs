//! HTTP-shaped connectors
//!
//! REST, GraphQL and HuggingFace share the same resource shape: a base URL,
//! key/value lists for query parameters, headers and cookies, and one of
//! three authentication modes. The request and response plumbing lives
//! here; each connector only decides what to send.

mod airtable;
mod graphql;
mod huggingface;
mod rest;

pub use airtable::AirtableConnector;
pub use graphql::GraphQlConnector;
pub use huggingface::{HfEndpointConnector, HuggingFaceConnector};
pub use rest::RestApiConnector;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::{Map, Value};
use switchyard_core::SwitchyardError;
use switchyard_types::{Options, RuntimeResult};
use tracing::debug;

use super::common::{
    canonical_header_name, collapse, merge_headers, merge_pairs, pairs, transport_error, KeyValue,
};
use super::traits::decode_resource;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Authentication {
    #[default]
    None,
    Basic,
    Bearer,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthContent {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub token: String,
}

/// Resource options shared by the HTTP-shaped connectors
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResource {
    #[serde(default, rename = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub url_params: Vec<KeyValue>,
    #[serde(default)]
    pub headers: Vec<KeyValue>,
    #[serde(default)]
    pub cookies: Vec<KeyValue>,
    #[serde(default)]
    pub authentication: Authentication,
    #[serde(default)]
    pub auth_content: AuthContent,
}

impl HttpResource {
    pub fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let resource: Self = decode_resource(options)?;
        match resource.authentication {
            Authentication::Basic if resource.auth_content.username.is_empty() => Err(
                SwitchyardError::InvalidResource("authContent.username is required".to_string()),
            ),
            Authentication::Bearer if resource.auth_content.token.is_empty() => Err(
                SwitchyardError::InvalidResource("authContent.token is required".to_string()),
            ),
            _ => Ok(resource),
        }
    }

    /// Attach credentials according to `authentication`
    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let content = &self.auth_content;
        match self.authentication {
            Authentication::None => request,
            Authentication::Basic => request.basic_auth(&content.username, Some(&content.password)),
            Authentication::Bearer => request.bearer_auth(&content.token),
        }
    }

    /// Apply resource and action query parameters, headers and cookies;
    /// action entries replace resource entries with the same key, and
    /// header names match regardless of case
    pub fn compose(
        &self,
        request: RequestBuilder,
        url_params: &[KeyValue],
        headers: &[KeyValue],
        cookies: &[KeyValue],
    ) -> RequestBuilder {
        let mut request = request.query(&merge_pairs(&self.url_params, url_params));
        for (name, value) in merge_headers(&self.headers, headers) {
            request = request.header(name, value);
        }
        let cookies = merge_pairs(&self.cookies, cookies);
        if !cookies.is_empty() {
            let header = cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(COOKIE, header);
        }
        self.authorize(request)
    }
}

/// Join a base URL and a path without doubling or dropping the slash
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) if !base.is_empty() && !path.is_empty() => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum BodyType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "form-data")]
    FormData,
    #[serde(rename = "x-www-form-urlencoded")]
    UrlEncoded,
    #[serde(rename = "binary")]
    Binary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawType {
    #[default]
    Json,
    Text,
    Xml,
    Html,
    Javascript,
}

impl RawType {
    fn content_type(self) -> &'static str {
        match self {
            RawType::Json => "application/json",
            RawType::Text => "text/plain",
            RawType::Xml => "application/xml",
            RawType::Html => "text/html",
            RawType::Javascript => "application/javascript",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBody {
    #[serde(default, rename = "type")]
    pub kind: RawType,
    #[serde(default)]
    pub content: Value,
}

impl RawBody {
    fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// A request body, decoded once according to its `bodyType`
#[derive(Debug, Clone)]
pub enum Body {
    None,
    Raw(RawBody),
    FormData(Vec<KeyValue>),
    UrlEncoded(Vec<KeyValue>),
    Binary(Vec<u8>),
}

impl Body {
    pub fn decode(body_type: BodyType, body: &Value) -> Result<Self, SwitchyardError> {
        let invalid = |e: serde_json::Error| SwitchyardError::InvalidAction(format!("body: {}", e));
        let pairs_of = |body: &Value| -> Result<Vec<KeyValue>, SwitchyardError> {
            match body {
                Value::Null => Ok(Vec::new()),
                other => serde_json::from_value(other.clone()).map_err(invalid),
            }
        };
        Ok(match body_type {
            BodyType::None => Body::None,
            BodyType::Raw => Body::Raw(match body {
                Value::Null => RawBody::default(),
                Value::String(text) => RawBody {
                    kind: RawType::Text,
                    content: Value::String(text.clone()),
                },
                other => serde_json::from_value(other.clone()).map_err(invalid)?,
            }),
            BodyType::FormData => Body::FormData(pairs_of(body)?),
            BodyType::UrlEncoded => Body::UrlEncoded(pairs_of(body)?),
            BodyType::Binary => {
                let text = match body {
                    Value::String(s) => s.as_str(),
                    Value::Null => "",
                    _ => {
                        return Err(SwitchyardError::InvalidAction(
                            "binary body must be base64 text".to_string(),
                        ))
                    }
                };
                Body::Binary(STANDARD.decode(text.trim()).map_err(|e| {
                    SwitchyardError::InvalidAction(format!("binary body: {}", e))
                })?)
            }
        })
    }

    /// Attach the body; `None` leaves the request without one
    pub fn attach(self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Body::None => request,
            Body::Raw(raw) => request
                .header(CONTENT_TYPE, raw.kind.content_type())
                .body(raw.text()),
            Body::FormData(fields) => {
                let form = pairs(&fields)
                    .into_iter()
                    .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                        form.text(name, value)
                    });
                request.multipart(form)
            }
            Body::UrlEncoded(fields) => request.form(&pairs(&fields)),
            Body::Binary(bytes) => request
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes),
        }
    }
}

/// Collapse a `{key, value}` list into an object, or pass an object through
pub fn variables(value: &Value) -> Result<Map<String, Value>, SwitchyardError> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Map::new()),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| SwitchyardError::InvalidAction(format!("variables: {}", e))),
        other => {
            let list: Vec<KeyValue> = serde_json::from_value(other.clone())
                .map_err(|e| SwitchyardError::InvalidAction(format!("variables: {}", e)))?;
            Ok(collapse(&list))
        }
    }
}

/// Send a request and shape the response
///
/// A JSON object body becomes one row, a JSON array of objects one row per
/// element, anything else no rows. The raw body and the response headers are
/// always kept in `extra`. Non-2xx statuses are not errors here.
pub async fn send(context: &str, request: RequestBuilder) -> Result<RuntimeResult, SwitchyardError> {
    let response = request.send().await.map_err(|e| transport_error(context, e))?;
    let status = response.status();

    let mut headers: Map<String, Value> = Map::new();
    for (name, value) in response.headers() {
        let entry = headers
            .entry(canonical_header_name(name.as_str()))
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()));
        }
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| SwitchyardError::OperationFailed(format!("{}: {}", context, e)))?;
    debug!(status = status.as_u16(), bytes = body.len(), "{} response", context);

    let rows = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) => vec![map.into_iter().collect()],
        Ok(Value::Array(items)) if items.iter().all(Value::is_object) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map.into_iter().collect()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(RuntimeResult::with_rows(rows)
        .with_extra("raw", Value::String(String::from_utf8_lossy(&body).into_owned()))
        .with_extra("headers", Value::Object(headers)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_authentication_is_a_closed_set() {
        assert!(matches!(
            HttpResource::decode(&options(json!({"authentication": "digest"}))),
            Err(SwitchyardError::InvalidResource(_))
        ));
        assert!(matches!(
            HttpResource::decode(&options(json!({"authentication": "bearer"}))),
            Err(SwitchyardError::InvalidResource(m)) if m.contains("token")
        ));
        assert_eq!(
            HttpResource::decode(&options(json!({}))).unwrap().authentication,
            Authentication::None
        );
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("https://a.io", "/v1"), "https://a.io/v1");
        assert_eq!(join_url("https://a.io/", "/v1"), "https://a.io/v1");
        assert_eq!(join_url("https://a.io", "v1"), "https://a.io/v1");
        assert_eq!(join_url("", "https://b.io/x"), "https://b.io/x");
        assert_eq!(join_url("https://a.io", ""), "https://a.io");
    }

    #[test]
    fn test_body_decoding() {
        assert!(matches!(
            Body::decode(BodyType::None, &json!({"ignored": true})).unwrap(),
            Body::None
        ));
        match Body::decode(BodyType::Binary, &json!("aGVsbG8=")).unwrap() {
            Body::Binary(bytes) => assert_eq!(bytes, b"hello"),
            other => panic!("unexpected body {:?}", other),
        }
        match Body::decode(BodyType::Raw, &json!({"type": "xml", "content": "<a/>"})).unwrap() {
            Body::Raw(raw) => assert_eq!(raw.kind, RawType::Xml),
            other => panic!("unexpected body {:?}", other),
        }
        assert!(Body::decode(BodyType::Binary, &json!("not base64!")).is_err());
    }

    #[test]
    fn test_variables_from_pairs_or_object() {
        let from_pairs = variables(&json!([{"key": "id", "value": 7}, {"key": "", "value": 1}])).unwrap();
        assert_eq!(Value::Object(from_pairs), json!({"id": 7}));
        let from_object = variables(&json!({"id": 7})).unwrap();
        assert_eq!(Value::Object(from_object), json!({"id": 7}));
    }

    #[tokio::test]
    async fn test_compose_merges_action_over_resource() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(query_param("page", "2"))
            .and(query_param("lang", "en"))
            .and(header("x-team", "action"))
            .and(header("cookie", "session=abc; theme=dark"))
            .and(body_string("name=widget"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 1}, {"id": 2}])))
            .mount(&server)
            .await;

        let resource = HttpResource::decode(&options(json!({
            "baseURL": server.uri(),
            "urlParams": [{"key": "page", "value": "1"}, {"key": "lang", "value": "en"}],
            "headers": [{"key": "x-team", "value": "resource"}],
            "cookies": [{"key": "session", "value": "abc"}]
        })))
        .unwrap();
        let kv = |k: &str, v: &str| KeyValue { key: k.to_string(), value: json!(v) };
        let request = resource.compose(
            reqwest::Client::new().post(join_url(&resource.base_url, "/items")),
            &[kv("page", "2")],
            &[kv("x-team", "action")],
            &[kv("theme", "dark")],
        );
        let request = Body::decode(BodyType::UrlEncoded, &json!([{"key": "name", "value": "widget"}]))
            .unwrap()
            .attach(request);

        let result = send("REST", request).await.unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.extra["raw"], json!("[{\"id\":1},{\"id\":2}]"));
    }

    #[tokio::test]
    async fn test_non_json_body_has_no_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string("oops")
                    .insert_header("x-trace", "t1"),
            )
            .mount(&server)
            .await;

        let result = send("REST", reqwest::Client::new().get(server.uri())).await.unwrap();
        assert!(result.success);
        assert!(result.rows.is_empty());
        assert_eq!(result.extra["raw"], json!("oops"));
        assert_eq!(result.extra["headers"]["X-Trace"], json!(["t1"]));
    }
}
