//! PostgreSQL dialect (also serves Supabase, Neon and Hydra)

use async_trait::async_trait;
use sqlx::postgres::{PgColumn, PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::{Column, Connection, Executor, Row, TypeInfo};
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, ResourceType};

use super::{connect_with_timeout, SqlDriver, SqlResourceOptions, SqlSession, SqlValue, VecCursor};

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_SCHEMA: &str = "public";

/// PostgreSQL driver opening one connection per operation
pub struct PostgresDriver {
    resource_type: ResourceType,
    config: Arc<RuntimeConfig>,
}

impl PostgresDriver {
    pub fn new(resource_type: ResourceType, config: Arc<RuntimeConfig>) -> Self {
        Self {
            resource_type,
            config,
        }
    }

    fn connect_options(opts: &SqlResourceOptions) -> PgConnectOptions {
        let mut connect = PgConnectOptions::new()
            .host(&opts.host)
            .port(opts.port.unwrap_or(DEFAULT_PORT))
            .username(&opts.database_username)
            .password(&opts.database_password);

        if !opts.database_name.is_empty() {
            connect = connect.database(&opts.database_name);
        }

        if opts.ssl.ssl {
            // The server name for verification is the configured host
            connect = if opts.ssl.server_cert.trim().is_empty() {
                connect.ssl_mode(PgSslMode::Require)
            } else {
                connect
                    .ssl_mode(PgSslMode::VerifyFull)
                    .ssl_root_cert_from_pem(opts.ssl.server_cert.as_bytes().to_vec())
            };
            if opts.ssl.has_client_identity() {
                connect = connect
                    .ssl_client_cert_from_pem(opts.ssl.client_cert.as_bytes())
                    .ssl_client_key_from_pem(opts.ssl.client_key.as_bytes());
            }
        } else {
            connect = connect.ssl_mode(PgSslMode::Disable);
        }

        connect
    }
}

#[async_trait]
impl SqlDriver for PostgresDriver {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn validate_resource(&self, options: &Options) -> Result<(), SwitchyardError> {
        SqlResourceOptions::decode(options).map(|_| ())
    }

    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError> {
        let opts = SqlResourceOptions::decode(options)?;
        let connect = Self::connect_options(&opts);

        let conn = connect_with_timeout(self.config.sql_connect_timeout(), "PostgreSQL", async {
            PgConnection::connect_with(&connect)
                .await
                .map_err(|e| SwitchyardError::ConnectFailed(format!("PostgreSQL: {}", e)))
        })
        .await?;

        Ok(Box::new(PostgresSession { conn }))
    }
}

struct PostgresSession {
    conn: PgConnection,
}

/// How a column's cells are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Uuid,
    Bytes,
    TimestampTz,
    Timestamp,
    Date,
    Json,
    /// Everything else is passed through as its textual form
    /// (NUMERIC, TIME, INTERVAL, INET, arrays, enums and so on)
    Text,
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOL" => ColumnKind::Bool,
        "INT2" => ColumnKind::Int2,
        "INT4" => ColumnKind::Int4,
        "INT8" => ColumnKind::Int8,
        "FLOAT4" => ColumnKind::Float4,
        "FLOAT8" => ColumnKind::Float8,
        "UUID" => ColumnKind::Uuid,
        "BYTEA" => ColumnKind::Bytes,
        "TIMESTAMPTZ" => ColumnKind::TimestampTz,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "DATE" => ColumnKind::Date,
        "JSON" | "JSONB" => ColumnKind::Json,
        _ => ColumnKind::Text,
    }
}

/// Convert a PostgreSQL cell into a driver-neutral value
fn column_value(row: &PgRow, column: &PgColumn) -> SqlValue {
    let idx = column.ordinal();

    match column_kind(column.type_info().name()) {
        ColumnKind::Bool => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        ColumnKind::Int2 => row
            .try_get::<Option<i16>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Int(v.into()))
            .unwrap_or(SqlValue::Null),
        ColumnKind::Int4 => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Int(v.into()))
            .unwrap_or(SqlValue::Null),
        ColumnKind::Int8 => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        ColumnKind::Float4 => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Float(v.into()))
            .unwrap_or(SqlValue::Null),
        ColumnKind::Float8 => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Null),
        ColumnKind::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Uuid(v.into_bytes()))
            .unwrap_or(SqlValue::Null),
        ColumnKind::Bytes => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Bytes)
            .unwrap_or(SqlValue::Null),
        ColumnKind::TimestampTz => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_rfc3339()))
            .unwrap_or(SqlValue::Null),
        ColumnKind::Timestamp => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_string()))
            .unwrap_or(SqlValue::Null),
        ColumnKind::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Text(v.to_string()))
            .unwrap_or(SqlValue::Null),
        ColumnKind::Json => row
            .try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Json)
            .unwrap_or(SqlValue::Null),
        // Plain queries use the simple protocol, so cells arrive as text
        // and String decodes them once the type check is skipped
        ColumnKind::Text => row
            .try_get_unchecked::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .into(),
    }
}

fn to_cursor(rows: &[PgRow]) -> VecCursor {
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

fn query_error(e: sqlx::Error) -> SwitchyardError {
    SwitchyardError::OperationFailed(format!("PostgreSQL: {}", e))
}

#[async_trait]
impl SqlSession for PostgresSession {
    async fn query(&mut self, sql: &str) -> Result<VecCursor, SwitchyardError> {
        let rows = self.conn.fetch_all(sql).await.map_err(query_error)?;
        Ok(to_cursor(&rows))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SwitchyardError> {
        let result = self.conn.execute(sql).await.map_err(query_error)?;
        Ok(result.rows_affected())
    }

    async fn ping(&mut self) -> Result<(), SwitchyardError> {
        self.conn
            .ping()
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(format!("PostgreSQL: {}", e)))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, SwitchyardError> {
        sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables WHERE table_schema = $1 ORDER BY table_name",
        )
        .bind(DEFAULT_SCHEMA)
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_error)
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<(String, String)>, SwitchyardError> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT column_name::text, data_type::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
        )
        .bind(DEFAULT_SCHEMA)
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .map_err(query_error)
    }

    async fn close(self: Box<Self>) -> Result<(), SwitchyardError> {
        self.conn
            .close()
            .await
            .map_err(|e| SwitchyardError::OperationFailed(format!("PostgreSQL close: {}", e)))
    }
}
