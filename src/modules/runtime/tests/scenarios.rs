//! Action files dispatched end to end against mock HTTP services

use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_core::{EndpointConfig, RuntimeConfig, SwitchyardError};
use switchyard_parser::{parse_string, FileFormat};
use switchyard_runtime::{into_response, ActionDispatcher, DispatchRequest};
use switchyard_types::Options;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options(value: Value) -> Options {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_rest_action_file_round_trip() {
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

    let yaml = format!(
        r#"
name: ping-api
resource:
  type: restapi
  options:
    baseURL: "{}"
    authentication: bearer
    authContent:
      token: T
    headers: []
    cookies: []
    urlParams: []
action:
  template:
    url: /v1/ping
    method: GET
    bodyType: none
ids:
  action_id: act_ping
"#,
        server.uri()
    );
    let file = parse_string(&yaml, FileFormat::Yaml).unwrap();
    let dispatcher = ActionDispatcher::new(Arc::new(file.runtime_config()));
    let response = into_response(dispatcher.run_action(DispatchRequest::from(&file)).await);

    assert!(response.success);
    assert!(response.error.is_empty());
    assert_eq!(response.rows.len(), 1);
    assert_eq!(response.rows[0]["ok"], json!(true));
    assert_eq!(response.extra["headers"]["X-Req"], json!(["1"]));
}

#[tokio::test]
async fn test_huggingface_without_token_is_rejected() {
    let dispatcher = ActionDispatcher::new(Arc::new(RuntimeConfig::default()));
    let err = dispatcher
        .validate_resource("huggingface", &options(json!({"authentication": "none"})))
        .unwrap_err();
    assert!(matches!(&err, SwitchyardError::InvalidResource(m) if m.contains("authentication error")));

    let response = into_response(Err(err));
    assert!(!response.success);
    assert_eq!(response.kind.as_deref(), Some("InvalidResource"));
}

#[tokio::test]
async fn test_aiagent_through_configured_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/virtual/aiagent"))
        .and(header("authorization", "Bearer svc-token"))
        .and(body_json(json!({"aiAgentID": "agent-1", "input": {"question": "status?"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"payload": "all green"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = RuntimeConfig {
        endpoints: EndpointConfig {
            aiagent: Some(format!("{}/virtual/aiagent", server.uri())),
            aiagent_token: Some("svc-token".to_string()),
            ..EndpointConfig::default()
        },
        ..RuntimeConfig::default()
    };
    let result = ActionDispatcher::new(Arc::new(config))
        .run_action(DispatchRequest::new(
            "aiagent",
            Options::new(),
            options(json!({"aiAgentID": "agent-1", "input": {"question": "status?"}})),
        ))
        .await
        .unwrap();
    assert_eq!(result.rows[0]["payload"], json!("all green"));
}

#[tokio::test]
async fn test_graphql_query_and_missing_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"viewer": {"login": "x"}}})))
        .mount(&server)
        .await;

    let dispatcher = ActionDispatcher::new(Arc::new(RuntimeConfig::default()));
    let resource = options(json!({"baseURL": format!("{}/graphql", server.uri())}));

    let result = dispatcher
        .run_action(DispatchRequest::new(
            "graphql",
            resource.clone(),
            options(json!({"query": "{ viewer { login } }"})),
        ))
        .await
        .unwrap();
    assert_eq!(result.rows[0]["data"]["viewer"]["login"], json!("x"));

    let missing_query = dispatcher
        .run_action(DispatchRequest::new("graphql", resource, Options::new()))
        .await;
    assert!(matches!(missing_query, Err(SwitchyardError::InvalidAction(_))));
}
