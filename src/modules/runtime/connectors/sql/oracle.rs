//! Oracle dialect
//!
//! The `oracle` crate is synchronous and links against the Oracle client
//! libraries, so it is only compiled with the `oracle` feature. Calls run on
//! the blocking pool. Without the feature the driver still validates options
//! but every I/O operation is unsupported.

use async_trait::async_trait;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, ResourceType};

#[cfg(feature = "oracle")]
use super::{connect_with_timeout, SqlValue, VecCursor};
use super::{SqlDriver, SqlResourceOptions, SqlSession};

#[cfg(feature = "oracle")]
const DEFAULT_PORT: u16 = 1521;

/// Oracle driver opening one connection per operation
pub struct OracleDriver {
    #[cfg_attr(not(feature = "oracle"), allow(dead_code))]
    config: Arc<RuntimeConfig>,
}

impl OracleDriver {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

/// Easy Connect string: `//host:port/service`
#[cfg_attr(not(feature = "oracle"), allow(dead_code))]
fn connect_string(opts: &SqlResourceOptions, default_port: u16) -> String {
    format!(
        "//{}:{}/{}",
        opts.host,
        opts.port.unwrap_or(default_port),
        opts.database_name
    )
}

#[async_trait]
impl SqlDriver for OracleDriver {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Oracle
    }

    fn validate_resource(&self, options: &Options) -> Result<(), SwitchyardError> {
        SqlResourceOptions::decode(options).map(|_| ())
    }

    #[cfg(feature = "oracle")]
    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError> {
        let opts = SqlResourceOptions::decode(options)?;
        let target = connect_string(&opts, DEFAULT_PORT);
        let username = opts.database_username.clone();
        let password = opts.database_password.clone();

        let conn = connect_with_timeout(self.config.sql_connect_timeout(), "Oracle", async move {
            tokio::task::spawn_blocking(move || {
                oracle::Connection::connect(&username, &password, &target)
            })
            .await
            .map_err(|e| SwitchyardError::Internal(format!("Oracle worker failed: {}", e)))?
            .map_err(|e| SwitchyardError::ConnectFailed(format!("Oracle: {}", e)))
        })
        .await?;

        Ok(Box::new(OracleSession { conn: Some(conn) }))
    }

    #[cfg(not(feature = "oracle"))]
    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError> {
        SqlResourceOptions::decode(options)?;
        Err(SwitchyardError::Unsupported(
            "Oracle support is not compiled into this build".to_string(),
        ))
    }
}

#[cfg(feature = "oracle")]
struct OracleSession {
    conn: Option<oracle::Connection>,
}

#[cfg(feature = "oracle")]
impl OracleSession {
    /// Lend the connection to the blocking pool and take it back afterwards
    async fn with_conn<T, F>(&mut self, work: F) -> Result<T, SwitchyardError>
    where
        T: Send + 'static,
        F: FnOnce(&oracle::Connection) -> Result<T, oracle::Error> + Send + 'static,
    {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| SwitchyardError::Internal("Oracle session already closed".to_string()))?;

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = work(&conn);
            (conn, result)
        })
        .await
        .map_err(|e| SwitchyardError::Internal(format!("Oracle worker failed: {}", e)))?;

        self.conn = Some(conn);
        result.map_err(|e| SwitchyardError::OperationFailed(format!("Oracle: {}", e)))
    }
}

#[cfg(feature = "oracle")]
fn column_value(row: &oracle::Row, idx: usize) -> SqlValue {
    if let Ok(Some(v)) = row.get::<usize, Option<i64>>(idx) {
        return SqlValue::Int(v);
    }
    if let Ok(Some(v)) = row.get::<usize, Option<f64>>(idx) {
        return SqlValue::Float(v);
    }
    if let Ok(Some(v)) = row.get::<usize, Option<String>>(idx) {
        return SqlValue::Text(v);
    }
    if let Ok(Some(v)) = row.get::<usize, Option<Vec<u8>>>(idx) {
        return SqlValue::Bytes(v);
    }
    SqlValue::Null
}

#[cfg(feature = "oracle")]
#[async_trait]
impl SqlSession for OracleSession {
    async fn query(&mut self, sql: &str) -> Result<VecCursor, SwitchyardError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let rows = conn.query(&sql, &[])?;
            let columns: Vec<String> = rows
                .column_info()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            let mut values = Vec::new();
            for row in rows {
                let row = row?;
                values.push((0..columns.len()).map(|idx| column_value(&row, idx)).collect());
            }
            Ok(VecCursor::new(columns, values))
        })
        .await
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SwitchyardError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let stmt = conn.execute(&sql, &[])?;
            let affected = stmt.row_count()?;
            conn.commit()?;
            Ok(affected)
        })
        .await
    }

    async fn ping(&mut self) -> Result<(), SwitchyardError> {
        self.with_conn(|conn| conn.ping()).await
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, SwitchyardError> {
        self.with_conn(|conn| {
            let rows = conn.query_as::<String>(
                "SELECT table_name FROM user_tables ORDER BY table_name",
                &[],
            )?;
            rows.collect()
        })
        .await
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<(String, String)>, SwitchyardError> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let rows = conn.query_as::<(String, String)>(
                "SELECT column_name, data_type FROM user_tab_columns \
                 WHERE table_name = :1 ORDER BY column_id",
                &[&table],
            )?;
            rows.collect()
        })
        .await
    }

    async fn close(mut self: Box<Self>) -> Result<(), SwitchyardError> {
        self.with_conn(|conn| conn.close()).await
    }
}
