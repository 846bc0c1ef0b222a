//! MySQL dialect (also serves MariaDB and TiDB)

use async_trait::async_trait;
use sqlx::mysql::{MySqlColumn, MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow, MySqlSslMode};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, ResourceType};

use super::syntax::reshape_driver_error;
use super::{connect_with_timeout, SqlDriver, SqlResourceOptions, SqlSession, SqlValue, VecCursor};

const DEFAULT_PORT: u16 = 3306;

/// MySQL driver opening one connection per operation
pub struct MySqlDriver {
    resource_type: ResourceType,
    config: Arc<RuntimeConfig>,
}

impl MySqlDriver {
    pub fn new(resource_type: ResourceType, config: Arc<RuntimeConfig>) -> Self {
        Self {
            resource_type,
            config,
        }
    }

    fn connect_options(opts: &SqlResourceOptions) -> MySqlConnectOptions {
        let mut connect = MySqlConnectOptions::new()
            .host(&opts.host)
            .port(opts.port.unwrap_or(DEFAULT_PORT))
            .username(&opts.database_username)
            .password(&opts.database_password);

        if !opts.database_name.is_empty() {
            connect = connect.database(&opts.database_name);
        }

        if opts.ssl.ssl {
            connect = if opts.ssl.server_cert.trim().is_empty() {
                connect.ssl_mode(MySqlSslMode::Required)
            } else {
                connect
                    .ssl_mode(MySqlSslMode::VerifyIdentity)
                    .ssl_ca_from_pem(opts.ssl.server_cert.as_bytes().to_vec())
            };
            if opts.ssl.has_client_identity() {
                connect = connect
                    .ssl_client_cert_from_pem(opts.ssl.client_cert.as_bytes())
                    .ssl_client_key_from_pem(opts.ssl.client_key.as_bytes());
            }
        } else {
            connect = connect.ssl_mode(MySqlSslMode::Disabled);
        }

        connect
    }
}

/// Render a driver error as `Error <number>: <message>` and reshape syntax errors
pub(crate) fn mysql_error(e: sqlx::Error) -> SwitchyardError {
    let rendered = match e
        .as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
    {
        Some(db) => format!("Error {}: {}", db.number(), db.message()),
        None => e.to_string(),
    };
    reshape_driver_error(rendered)
}

#[async_trait]
impl SqlDriver for MySqlDriver {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn validate_resource(&self, options: &Options) -> Result<(), SwitchyardError> {
        SqlResourceOptions::decode(options).map(|_| ())
    }

    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError> {
        let opts = SqlResourceOptions::decode(options)?;
        let connect = Self::connect_options(&opts);

        let conn = connect_with_timeout(self.config.sql_connect_timeout(), "MySQL", async {
            MySqlConnection::connect_with(&connect)
                .await
                .map_err(|e| SwitchyardError::ConnectFailed(format!("MySQL: {}", e)))
        })
        .await?;

        Ok(Box::new(MySqlSession {
            conn,
            database: opts.database_name,
        }))
    }
}

struct MySqlSession {
    conn: MySqlConnection,
    database: String,
}

fn column_value(row: &MySqlRow, column: &MySqlColumn) -> SqlValue {
    let idx = column.ordinal();

    match column.type_info().name() {
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => match row.try_get::<Option<u64>, _>(idx).ok().flatten() {
            Some(v) => i64::try_from(v)
                .map(SqlValue::Int)
                .unwrap_or_else(|_| SqlValue::Text(v.to_string())),
            None => SqlValue::Null,
        },
        "FLOAT" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Float(v.into()))
            .unwrap_or(SqlValue::Null),
        "DOUBLE" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        "DATETIME" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_string()))
            .unwrap_or(SqlValue::Null),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_rfc3339()))
            .unwrap_or(SqlValue::Null),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_string()))
            .unwrap_or(SqlValue::Null),
        "JSON" => row
            .try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Json)
            .unwrap_or(SqlValue::Null),
        // DECIMAL, TEXT, VARCHAR and BLOB columns all arrive as bytes on the wire
        _ => row
            .try_get_unchecked::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null),
    }
}

fn to_cursor(rows: &[MySqlRow]) -> VecCursor {
    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let values = rows
        .iter()
        .map(|row| row.columns().iter().map(|c| column_value(row, c)).collect())
        .collect();

    VecCursor::new(columns, values)
}

#[async_trait]
impl SqlSession for MySqlSession {
    async fn query(&mut self, sql: &str) -> Result<VecCursor, SwitchyardError> {
        let rows = self.conn.fetch_all(sql).await.map_err(mysql_error)?;
        Ok(to_cursor(&rows))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SwitchyardError> {
        let result = self.conn.execute(sql).await.map_err(mysql_error)?;
        Ok(result.rows_affected())
    }

    async fn ping(&mut self) -> Result<(), SwitchyardError> {
        self.conn
            .ping()
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(format!("MySQL: {}", e)))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, SwitchyardError> {
        sqlx::query_scalar::<_, String>(
            "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
             WHERE table_schema = COALESCE(NULLIF(?, ''), DATABASE()) ORDER BY table_name",
        )
        .bind(&self.database)
        .fetch_all(&mut self.conn)
        .await
        .map_err(mysql_error)
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<(String, String)>, SwitchyardError> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT CAST(column_name AS CHAR), CAST(data_type AS CHAR) FROM information_schema.columns \
             WHERE table_schema = COALESCE(NULLIF(?, ''), DATABASE()) AND table_name = ? \
             ORDER BY ordinal_position",
        )
        .bind(&self.database)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(mysql_error)
    }

    async fn close(self: Box<Self>) -> Result<(), SwitchyardError> {
        self.conn
            .close()
            .await
            .map_err(|e| SwitchyardError::OperationFailed(format!("MySQL close: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_errors_are_not_reshaped() {
        let err = mysql_error(sqlx::Error::RowNotFound);
        assert!(matches!(err, SwitchyardError::OperationFailed(_)));
    }

    #[test]
    fn test_validate_resource_flexible_port() {
        let driver = MySqlDriver::new(ResourceType::Tidb, Arc::new(RuntimeConfig::default()));
        let options = json!({"host": "db", "port": 4000, "databaseUsername": "root"});
        assert!(driver.validate_resource(options.as_object().unwrap()).is_ok());

        let options = json!({"host": "db", "port": "not-a-port", "databaseUsername": "root"});
        assert!(matches!(
            driver.validate_resource(options.as_object().unwrap()),
            Err(SwitchyardError::InvalidResource(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires a running MySQL instance
    async fn test_mysql_syntax_error_is_reshaped() {
        let driver = MySqlDriver::new(ResourceType::Mysql, Arc::new(RuntimeConfig::default()));
        let options = json!({
            "host": "localhost",
            "databaseUsername": "root",
            "databasePassword": "root",
            "databaseName": "mysql"
        });
        let mut session = driver.open(options.as_object().unwrap()).await.unwrap();
        let err = session.query("SELECT * FORM user").await.unwrap_err();
        assert!(matches!(err, SwitchyardError::SqlSyntax { line_number: 1, .. }));
        session.close().await.unwrap();
    }
}
