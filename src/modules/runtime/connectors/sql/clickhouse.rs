//! ClickHouse dialect over the HTTP interface

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, ResourceType};
use tracing::debug;

use super::{SqlDriver, SqlResourceOptions, SqlSession, SqlValue, VecCursor};
use crate::connectors::common::{http_client, json_response, transport_error};

const DEFAULT_PORT: u16 = 8123;
const DEFAULT_TLS_PORT: u16 = 8443;

/// ClickHouse driver; a session is an HTTP client bound to one server
pub struct ClickHouseDriver {
    config: Arc<RuntimeConfig>,
}

impl ClickHouseDriver {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

/// Base URL of the HTTP interface
fn base_url(opts: &SqlResourceOptions) -> String {
    let host = opts.host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        return match opts.port {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
    }

    let (scheme, default_port) = if opts.ssl.ssl {
        ("https", DEFAULT_TLS_PORT)
    } else {
        ("http", DEFAULT_PORT)
    };
    format!("{}://{}:{}", scheme, host, opts.port.unwrap_or(default_port))
}

#[async_trait]
impl SqlDriver for ClickHouseDriver {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Clickhouse
    }

    fn validate_resource(&self, options: &Options) -> Result<(), SwitchyardError> {
        SqlResourceOptions::decode(options).map(|_| ())
    }

    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError> {
        let opts = SqlResourceOptions::decode(options)?;
        Ok(Box::new(ClickHouseSession {
            client: http_client(&self.config)?,
            base_url: base_url(&opts),
            database: opts.database_name,
            username: opts.database_username,
            password: opts.database_password,
        }))
    }
}

struct ClickHouseSession {
    client: reqwest::Client,
    base_url: String,
    database: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ColumnMeta {
    name: String,
}

/// Body of a `FORMAT JSON` response
#[derive(Debug, Deserialize)]
struct JsonFormat {
    #[serde(default)]
    meta: Vec<ColumnMeta>,
    #[serde(default)]
    data: Vec<serde_json::Map<String, Value>>,
}

impl JsonFormat {
    fn into_cursor(self) -> VecCursor {
        let columns: Vec<String> = self.meta.into_iter().map(|c| c.name).collect();
        let rows = self
            .data
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.remove(c).map(SqlValue::Json).unwrap_or(SqlValue::Null))
                    .collect()
            })
            .collect();
        VecCursor::new(columns, rows)
    }
}

/// `X-ClickHouse-Summary` reports counters as strings
#[derive(Debug, Default, Deserialize)]
struct Summary {
    #[serde(default)]
    written_rows: Option<Value>,
}

impl Summary {
    fn written_rows(&self) -> u64 {
        match &self.written_rows {
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            _ => 0,
        }
    }
}

impl ClickHouseSession {
    fn request(&self, sql: &str, params: &[(&str, &str)]) -> reqwest::RequestBuilder {
        let mut query: Vec<(String, String)> = vec![("default_format".into(), "JSON".into())];
        if !self.database.is_empty() {
            query.push(("database".into(), self.database.clone()));
        }
        for (name, value) in params {
            query.push((format!("param_{}", name), value.to_string()));
        }

        self.client
            .post(format!("{}/", self.base_url))
            .query(&query)
            .header("X-ClickHouse-User", &self.username)
            .header("X-ClickHouse-Key", &self.password)
            .body(sql.to_string())
    }

    async fn select(&self, sql: &str, params: &[(&str, &str)]) -> Result<JsonFormat, SwitchyardError> {
        debug!("ClickHouse query");
        let response = self
            .request(sql, params)
            .send()
            .await
            .map_err(|e| transport_error("ClickHouse", e))?;
        let body = json_response("ClickHouse", response).await?;
        if body.is_null() {
            return Ok(JsonFormat {
                meta: Vec::new(),
                data: Vec::new(),
            });
        }
        serde_json::from_value(body)
            .map_err(|e| SwitchyardError::OperationFailed(format!("ClickHouse: {}", e)))
    }

    fn database_expr(&self) -> &'static str {
        if self.database.is_empty() {
            "currentDatabase()"
        } else {
            "{db:String}"
        }
    }
}

#[async_trait]
impl SqlSession for ClickHouseSession {
    async fn query(&mut self, sql: &str) -> Result<VecCursor, SwitchyardError> {
        Ok(self.select(sql, &[]).await?.into_cursor())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SwitchyardError> {
        let response = self
            .request(sql, &[])
            .send()
            .await
            .map_err(|e| transport_error("ClickHouse", e))?;

        let summary: Summary = response
            .headers()
            .get("X-ClickHouse-Summary")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        json_response("ClickHouse", response).await?;
        Ok(summary.written_rows())
    }

    async fn ping(&mut self) -> Result<(), SwitchyardError> {
        let response = self
            .client
            .get(format!("{}/ping", self.base_url))
            .send()
            .await
            .map_err(|e| transport_error("ClickHouse", e))?;
        if !response.status().is_success() {
            return Err(SwitchyardError::ConnectFailed(format!(
                "ClickHouse ping returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, SwitchyardError> {
        let sql = format!(
            "SELECT name FROM system.tables WHERE database = {} ORDER BY name",
            self.database_expr()
        );
        let database = self.database.clone();
        let result = self.select(&sql, &[("db", &database)]).await?;
        Ok(result
            .data
            .into_iter()
            .filter_map(|mut row| match row.remove("name") {
                Some(Value::String(name)) => Some(name),
                _ => None,
            })
            .collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<(String, String)>, SwitchyardError> {
        let sql = format!(
            "SELECT name, type FROM system.columns \
             WHERE database = {} AND table = {{tbl:String}} ORDER BY position",
            self.database_expr()
        );
        let database = self.database.clone();
        let result = self
            .select(&sql, &[("db", &database), ("tbl", table)])
            .await?;
        Ok(result
            .data
            .into_iter()
            .filter_map(|mut row| match (row.remove("name"), row.remove("type")) {
                (Some(Value::String(name)), Some(Value::String(data_type))) => {
                    Some((name, data_type))
                }
                _ => None,
            })
            .collect())
    }

    async fn close(self: Box<Self>) -> Result<(), SwitchyardError> {
        Ok(())
    }
}
