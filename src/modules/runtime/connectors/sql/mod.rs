//! SQL-shaped connectors
//!
//! Every SQL dialect shares one [`SqlConnector`], parameterised by a
//! [`SqlDriver`] that knows how to open a [`SqlSession`]. The connector owns
//! the common behaviour: action validation through the statement classifier,
//! the query/exec split, schema listing, and closing the session on every
//! path.

mod clickhouse;
mod mssql;
mod mysql;
mod oracle;
mod postgres;
pub mod rows;
mod snowflake;
pub mod syntax;

pub use clickhouse::ClickHouseDriver;
pub use mssql::MssqlDriver;
pub use mysql::MySqlDriver;
pub use oracle::OracleDriver;
pub use postgres::PostgresDriver;
pub use rows::{rows_to_mappings, RowCursor, SqlValue, VecCursor};
pub use snowflake::SnowflakeDriver;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use switchyard_core::SwitchyardError;
use switchyard_parser::is_select_sql;
use switchyard_types::{
    ConnectionResult, MetaInfoResult, Options, ResourceType, RuntimeResult, ValidateResult,
};
use tracing::{debug, warn};

pub(crate) use super::common::connect_with_timeout;
use super::common::{flexible_bool, flexible_port};
use super::traits::{decode_action, decode_resource, require_resource, Connector};

/// An open database session
///
/// Sessions are owned by a single operation and must be closed by it.
#[async_trait]
pub trait SqlSession: Send {
    /// Run a read statement and return its rows
    async fn query(&mut self, sql: &str) -> Result<VecCursor, SwitchyardError>;

    /// Run a write statement and return the affected-row count
    async fn execute(&mut self, sql: &str) -> Result<u64, SwitchyardError>;

    /// Lightweight liveness probe
    async fn ping(&mut self) -> Result<(), SwitchyardError>;

    /// Tables in the configured schema
    async fn list_tables(&mut self) -> Result<Vec<String>, SwitchyardError>;

    /// `(column, data type)` pairs of one table
    async fn list_columns(&mut self, table: &str)
        -> Result<Vec<(String, String)>, SwitchyardError>;

    /// Release the session
    async fn close(self: Box<Self>) -> Result<(), SwitchyardError>;
}

/// A dialect: resource validation and session construction
#[async_trait]
pub trait SqlDriver: Send + Sync {
    fn resource_type(&self) -> ResourceType;

    /// Check the dialect's resource options without I/O
    fn validate_resource(&self, options: &Options) -> Result<(), SwitchyardError>;

    /// Open a session from resource options
    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError>;
}

/// TLS settings carried by SQL resources
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SslOptions {
    #[serde(default, deserialize_with = "flexible_bool")]
    pub ssl: bool,
    #[serde(default)]
    pub server_cert: String,
    #[serde(default)]
    pub client_key: String,
    #[serde(default)]
    pub client_cert: String,
}

impl SslOptions {
    /// Both halves of a client identity are present
    pub fn has_client_identity(&self) -> bool {
        !self.client_cert.trim().is_empty() && !self.client_key.trim().is_empty()
    }
}

/// SSH tunnel settings; tunnelling is not performed by this crate
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshOptions {
    #[serde(default, deserialize_with = "flexible_bool")]
    pub ssh: bool,
}

/// Resource options shared by host-based SQL dialects
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlResourceOptions {
    pub host: String,
    #[serde(default, deserialize_with = "flexible_port")]
    pub port: Option<u16>,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub database_username: String,
    #[serde(default)]
    pub database_password: String,
    #[serde(default)]
    pub ssl: SslOptions,
    #[serde(default)]
    pub ssh: SshOptions,
}

impl SqlResourceOptions {
    /// Decode and check presence of the connection fields
    pub fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.host, "host")?;
        require_resource(&opts.database_username, "databaseUsername")?;
        if opts.ssh.ssh {
            return Err(SwitchyardError::Unsupported(
                "SSH tunnelling is not supported".to_string(),
            ));
        }
        Ok(opts)
    }
}

/// How the statement was authored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlMode {
    Gui,
    Sql,
}

/// Action template of every SQL connector
#[derive(Debug, Clone, Deserialize)]
pub struct SqlActionTemplate {
    pub mode: SqlMode,
    #[serde(default)]
    pub query: String,
}

impl SqlActionTemplate {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let template: Self = decode_action(options)?;
        if template.mode == SqlMode::Sql {
            if template.query.trim().is_empty() {
                return Err(SwitchyardError::InvalidAction("query is required".to_string()));
            }
            is_select_sql(&template.query)
                .map_err(|e| SwitchyardError::InvalidAction(e.to_string()))?;
        }
        Ok(template)
    }
}

/// Connector for any SQL dialect
pub struct SqlConnector<D: SqlDriver> {
    driver: D,
}

impl<D: SqlDriver> SqlConnector<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    async fn run_statement(
        session: &mut dyn SqlSession,
        query: &str,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let is_select =
            is_select_sql(query).map_err(|e| SwitchyardError::InvalidAction(e.to_string()))?;

        if is_select {
            let mut cursor = session.query(query).await?;
            Ok(RuntimeResult::with_rows(rows_to_mappings(&mut cursor)))
        } else {
            let affected = session.execute(query).await?;
            Ok(RuntimeResult::empty()
                .with_extra("message", json!(format!("Affected {} rows.", affected))))
        }
    }

    async fn describe(
        session: &mut dyn SqlSession,
    ) -> Result<HashMap<String, Value>, SwitchyardError> {
        let mut schema = HashMap::new();
        for table in session.list_tables().await? {
            let columns: serde_json::Map<String, Value> = session
                .list_columns(&table)
                .await?
                .into_iter()
                .map(|(column, data_type)| (column, json!({ "data_type": data_type })))
                .collect();
            schema.insert(table, Value::Object(columns));
        }
        Ok(schema)
    }

    /// Close a session, keeping the operation's own error if it had one
    async fn finish<T>(
        &self,
        session: Box<dyn SqlSession>,
        result: Result<T, SwitchyardError>,
    ) -> Result<T, SwitchyardError> {
        if let Err(e) = session.close().await {
            warn!("Failed to close {} session: {}", self.driver.resource_type(), e);
        }
        result
    }
}

#[async_trait]
impl<D: SqlDriver> Connector for SqlConnector<D> {
    fn resource_type(&self) -> ResourceType {
        self.driver.resource_type()
    }

    fn validate_resource_options(
        &self,
        options: &Options,
    ) -> Result<ValidateResult, SwitchyardError> {
        self.driver.validate_resource(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        SqlActionTemplate::decode(options)?;
        Ok(ValidateResult::valid())
    }

    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let mut session = self.driver.open(options).await?;
        let result = session.ping().await;
        self.finish(session, result).await?;
        Ok(ConnectionResult::success())
    }

    async fn get_meta_info(&self, options: &Options) -> Result<MetaInfoResult, SwitchyardError> {
        let mut session = self.driver.open(options).await?;
        let result = Self::describe(session.as_mut()).await;
        let schema = self.finish(session, result).await?;
        Ok(MetaInfoResult::new(schema))
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let template = SqlActionTemplate::decode(action_options)?;
        if template.mode == SqlMode::Gui {
            return Err(SwitchyardError::Unsupported(
                "GUI mode statements must be rendered to SQL before dispatch".to_string(),
            ));
        }

        debug!(resource_type = %self.driver.resource_type(), "Running SQL statement");
        let mut session = self.driver.open(resource_options).await?;
        let result = Self::run_statement(session.as_mut(), &template.query).await;
        self.finish(session, result).await
    }
}
