//! REST API connector

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, ResourceType, RuntimeResult, ValidateResult};
use tracing::debug;

use super::{join_url, send, Body, BodyType, HttpResource};
use crate::connectors::common::{http_client, KeyValue};
use crate::connectors::traits::{decode_action, require_action, Connector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestAction {
    #[serde(default)]
    url: String,
    method: Method,
    #[serde(default)]
    body_type: BodyType,
    #[serde(default)]
    body: Value,
    #[serde(default)]
    url_params: Vec<KeyValue>,
    #[serde(default)]
    headers: Vec<KeyValue>,
    #[serde(default)]
    cookies: Vec<KeyValue>,
}

impl RestAction {
    fn decode(options: &Options) -> Result<(Self, Body), SwitchyardError> {
        let action: Self = decode_action(options)?;
        let body = Body::decode(action.body_type, &action.body)?;
        Ok((action, body))
    }
}

/// REST API connector
pub struct RestApiConnector {
    config: Arc<RuntimeConfig>,
}

impl RestApiConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for RestApiConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::RestApi
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        HttpResource::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        RestAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let resource = HttpResource::decode(resource_options)?;
        let (action, body) = RestAction::decode(action_options)?;
        let url = join_url(&resource.base_url, &action.url);
        require_action(&url, "url")?;
        debug!(method = ?action.method, url = %url, "REST request");

        let request = http_client(&self.config)?.request(action.method.into(), &url);
        let request = resource.compose(request, &action.url_params, &action.headers, &action.cookies);
        send("REST", body.attach(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    fn connector() -> RestApiConnector {
        RestApiConnector::new(Arc::new(RuntimeConfig::default()))
    }

    #[test]
    fn test_action_validation() {
        let c = connector();
        assert!(c
            .validate_action_options(&options(json!({"url": "/x", "method": "GET"})))
            .is_ok());
        assert!(matches!(
            c.validate_action_options(&options(json!({"url": "/x", "method": "TRACE"}))),
            Err(SwitchyardError::InvalidAction(_))
        ));
        assert!(matches!(
            c.validate_action_options(&options(json!({
                "url": "/x", "method": "POST", "bodyType": "graphql"
            }))),
            Err(SwitchyardError::InvalidAction(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_is_unsupported() {
        assert!(matches!(
            connector().test_connection(&options(json!({}))).await,
            Err(SwitchyardError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_bearer_get_shapes_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/ping"))
            .and(header("authorization", "Bearer T"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true}))
                    .insert_header("x-req", "1"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let resource = options(json!({
            "baseURL": server.uri(),
            "authentication": "bearer",
            "authContent": {"token": "T"},
            "headers": [],
            "cookies": [],
            "urlParams": []
        }));
        let result = connector()
            .run(
                &resource,
                &options(json!({"url": "/v1/ping", "method": "GET", "bodyType": "none"})),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["ok"], json!(true));
        assert_eq!(result.extra["headers"]["X-Req"], json!(["1"]));
        assert_eq!(result.extra["raw"], json!("{\"ok\":true}"));
    }

    #[tokio::test]
    async fn test_action_header_replaces_resource_header_of_any_case() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/team"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        connector()
            .run(
                &options(json!({
                    "baseURL": server.uri(),
                    "headers": [{"key": "X-Team", "value": "resource"}]
                })),
                &options(json!({
                    "url": "/team",
                    "method": "GET",
                    "headers": [{"key": "x-team", "value": "action"}]
                })),
            )
            .await
            .unwrap();

        let received: Vec<Request> = server.received_requests().await.unwrap();
        let values: Vec<_> = received[0]
            .headers
            .get_all("x-team")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["action".to_string()]);
    }

    #[tokio::test]
    async fn test_body_type_none_sends_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submit"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        connector()
            .run(
                &options(json!({"baseURL": server.uri()})),
                &options(json!({
                    "url": "/submit",
                    "method": "POST",
                    "bodyType": "none",
                    "body": {"type": "json", "content": "{\"a\":1}"}
                })),
            )
            .await
            .unwrap();

        let received: Vec<Request> = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_raw_json_and_binary_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let resource = options(json!({"baseURL": server.uri()}));

        connector()
            .run(
                &resource,
                &options(json!({
                    "url": "/json",
                    "method": "PUT",
                    "bodyType": "raw",
                    "body": {"type": "json", "content": "{\"a\":1}"}
                })),
            )
            .await
            .unwrap();
        connector()
            .run(
                &resource,
                &options(json!({"url": "/bin", "method": "PUT", "bodyType": "binary", "body": "AAEC"})),
            )
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received[0].headers["content-type"], "application/json");
        assert_eq!(received[0].body, b"{\"a\":1}");
        assert_eq!(received[1].headers["content-type"], "application/octet-stream");
        assert_eq!(received[1].body, vec![0u8, 1, 2]);
    }

    #[tokio::test]
    async fn test_form_data_is_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        connector()
            .run(
                &options(json!({"baseURL": server.uri()})),
                &options(json!({
                    "url": "/upload",
                    "method": "POST",
                    "bodyType": "form-data",
                    "body": [{"key": "title", "value": "report"}]
                })),
            )
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let content_type = received[0].headers["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("multipart/form-data"));
        assert!(String::from_utf8_lossy(&received[0].body).contains("report"));
    }

    #[tokio::test]
    async fn test_refused_connection_fails() {
        let result = connector()
            .run(
                &options(json!({"baseURL": "http://127.0.0.1:9"})),
                &options(json!({"url": "/", "method": "GET"})),
            )
            .await;
        assert!(matches!(result, Err(SwitchyardError::ConnectFailed(_))));
    }
}
