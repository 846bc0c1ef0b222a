//! Dispatch invariants against an in-memory SQL driver

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_runtime::connectors::sql::{
    SqlConnector, SqlDriver, SqlResourceOptions, SqlSession, SqlValue, VecCursor,
};
use switchyard_runtime::{
    ActionDispatcher, AuditEvent, AuditSink, Connector, ConnectorFactory, DispatchRequest,
};
use switchyard_types::{Options, ResourceType};

fn options(value: Value) -> Options {
    value.as_object().cloned().unwrap()
}

#[derive(Default)]
struct Counters {
    built: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Driver answering every query with one `{n: 1}` row and every write with 3 affected rows
#[derive(Clone)]
struct ScriptedDriver {
    counters: Arc<Counters>,
    fail: bool,
}

struct ScriptedSession {
    driver: ScriptedDriver,
}

#[async_trait]
impl SqlSession for ScriptedSession {
    async fn query(&mut self, _sql: &str) -> Result<VecCursor, SwitchyardError> {
        if self.driver.fail {
            return Err(SwitchyardError::OperationFailed("relation does not exist".to_string()));
        }
        Ok(VecCursor::new(vec!["n".to_string()], vec![vec![SqlValue::Int(1)]]))
    }

    async fn execute(&mut self, _sql: &str) -> Result<u64, SwitchyardError> {
        if self.driver.fail {
            return Err(SwitchyardError::OperationFailed("permission denied".to_string()));
        }
        Ok(3)
    }

    async fn ping(&mut self) -> Result<(), SwitchyardError> {
        Ok(())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, SwitchyardError> {
        Ok(vec!["t".to_string()])
    }

    async fn list_columns(&mut self, _table: &str) -> Result<Vec<(String, String)>, SwitchyardError> {
        Ok(vec![("x".to_string(), "integer".to_string())])
    }

    async fn close(self: Box<Self>) -> Result<(), SwitchyardError> {
        self.driver.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SqlDriver for ScriptedDriver {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Postgresql
    }

    fn validate_resource(&self, options: &Options) -> Result<(), SwitchyardError> {
        SqlResourceOptions::decode(options).map(|_| ())
    }

    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError> {
        SqlResourceOptions::decode(options)?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            driver: self.clone(),
        }))
    }
}

/// Factory knowing only PostgreSQL
struct ScriptedFactory {
    counters: Arc<Counters>,
    fail: bool,
}

impl ConnectorFactory for ScriptedFactory {
    fn build(&self, resource_type: ResourceType) -> Option<Box<dyn Connector>> {
        self.counters.built.fetch_add(1, Ordering::SeqCst);
        (resource_type.family() == ResourceType::Postgresql).then(|| {
            Box::new(SqlConnector::new(ScriptedDriver {
                counters: Arc::clone(&self.counters),
                fail: self.fail,
            })) as Box<dyn Connector>
        })
    }
}

#[derive(Default)]
struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl AuditSink for MemorySink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn dispatcher(fail: bool) -> (ActionDispatcher, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let factory = ScriptedFactory {
        counters: Arc::clone(&counters),
        fail,
    };
    let dispatcher = ActionDispatcher::new(Arc::new(RuntimeConfig::default()))
        .with_factory(Arc::new(factory));
    (dispatcher, counters)
}

fn postgres_resource() -> Options {
    options(json!({
        "host": "db",
        "port": "5432",
        "databaseUsername": "u",
        "databasePassword": "p",
        "databaseName": "d",
        "ssl": {"ssl": false}
    }))
}

#[tokio::test]
async fn test_select_returns_rows() {
    let (dispatcher, counters) = dispatcher(false);
    let result = dispatcher
        .run_action(DispatchRequest::new(
            "postgresql",
            postgres_resource(),
            options(json!({"mode": "sql", "query": "SELECT 1 AS n"})),
        ))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["n"], json!(1));
    assert!(result.extra.is_empty());
    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_update_reports_affected_rows() {
    let (dispatcher, _) = dispatcher(false);
    let result = dispatcher
        .run_action(DispatchRequest::new(
            "postgresql",
            postgres_resource(),
            options(json!({"mode": "sql", "query": "UPDATE t SET x=1"})),
        ))
        .await
        .unwrap();

    assert!(result.rows.is_empty());
    assert_eq!(result.extra["message"], json!("Affected 3 rows."));
}

#[tokio::test]
async fn test_alias_resolves_to_family() {
    let (dispatcher, _) = dispatcher(false);
    let result = dispatcher
        .run_action(DispatchRequest::new(
            "neon",
            postgres_resource(),
            options(json!({"mode": "sql", "query": "select 1"})),
        ))
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_unknown_type_opens_nothing() {
    let (dispatcher, counters) = dispatcher(false);
    for tag in ["mongodb", "cassandra"] {
        let result = dispatcher
            .run_action(DispatchRequest::new(tag, postgres_resource(), Options::new()))
            .await;
        assert!(matches!(result, Err(SwitchyardError::UnsupportedType(t)) if t == tag));
    }
    assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_validation_failures_open_nothing() {
    let (dispatcher, counters) = dispatcher(false);

    let missing_host = dispatcher
        .run_action(DispatchRequest::new(
            "postgresql",
            options(json!({"databaseUsername": "u"})),
            options(json!({"mode": "sql", "query": "SELECT 1"})),
        ))
        .await;
    assert!(matches!(missing_host, Err(SwitchyardError::InvalidResource(_))));

    let empty_query = dispatcher
        .run_action(DispatchRequest::new(
            "postgresql",
            postgres_resource(),
            options(json!({"mode": "sql", "query": "  "})),
        ))
        .await;
    assert!(matches!(empty_query, Err(SwitchyardError::InvalidAction(_))));

    let unterminated = dispatcher
        .run_action(DispatchRequest::new(
            "postgresql",
            postgres_resource(),
            options(json!({"mode": "sql", "query": "SELECT 'oops"})),
        ))
        .await;
    assert!(matches!(unterminated, Err(SwitchyardError::InvalidAction(_))));

    let bad_mode = dispatcher
        .run_action(DispatchRequest::new(
            "postgresql",
            postgres_resource(),
            options(json!({"mode": "visual", "query": "SELECT 1"})),
        ))
        .await;
    assert!(matches!(bad_mode, Err(SwitchyardError::InvalidAction(_))));

    assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sessions_close_on_failure() {
    let (dispatcher, counters) = dispatcher(true);
    for query in ["SELECT * FROM missing", "DELETE FROM t"] {
        let result = dispatcher
            .run_action(DispatchRequest::new(
                "postgresql",
                postgres_resource(),
                options(json!({"mode": "sql", "query": query})),
            ))
            .await;
        assert!(matches!(result, Err(SwitchyardError::OperationFailed(_))));
    }
    assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_connection_check_before_run() {
    let (dispatcher, counters) = dispatcher(false);
    dispatcher
        .run_action(
            DispatchRequest::new(
                "postgresql",
                postgres_resource(),
                options(json!({"mode": "sql", "query": "SELECT 1"})),
            )
            .with_connection_test(true),
        )
        .await
        .unwrap();
    assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_meta_info_and_audit() {
    let (dispatcher, counters) = dispatcher(false);
    let sink = Arc::new(MemorySink::default());
    let dispatcher = dispatcher.with_audit_sink(sink.clone());

    let meta = dispatcher
        .get_meta_info("postgresql", &postgres_resource())
        .await
        .unwrap();
    assert_eq!(meta.schema["t"], json!({"x": {"data_type": "integer"}}));
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    // Entry points other than run_action are not audited
    assert!(sink.events.lock().unwrap().is_empty());

    dispatcher
        .run_action(
            DispatchRequest::new(
                "postgresql",
                postgres_resource(),
                options(json!({"mode": "sql", "query": "SELECT 1"})),
            )
            .with_ids(Some("a1".to_string()), Some("r1".to_string())),
        )
        .await
        .unwrap();
    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].success);
    assert_eq!(events[0].template["query"], json!("SELECT 1"));
}
