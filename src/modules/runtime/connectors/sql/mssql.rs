//! Microsoft SQL Server dialect over TDS

use async_trait::async_trait;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, ResourceType};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{connect_with_timeout, SqlDriver, SqlResourceOptions, SqlSession, SqlValue, VecCursor};

const DEFAULT_PORT: u16 = 1433;
const DEFAULT_SCHEMA: &str = "dbo";

/// SQL Server driver opening one TDS connection per operation
pub struct MssqlDriver {
    config: Arc<RuntimeConfig>,
}

impl MssqlDriver {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    fn tds_config(opts: &SqlResourceOptions) -> Config {
        let mut config = Config::new();
        config.host(&opts.host);
        config.port(opts.port.unwrap_or(DEFAULT_PORT));
        if !opts.database_name.is_empty() {
            config.database(&opts.database_name);
        }
        config.authentication(AuthMethod::sql_server(
            &opts.database_username,
            &opts.database_password,
        ));

        if opts.ssl.ssl {
            // tiberius only reads a CA from disk, so inline certificates are not pinned
            config.encryption(EncryptionLevel::Required);
            config.trust_cert();
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl SqlDriver for MssqlDriver {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Mssql
    }

    fn validate_resource(&self, options: &Options) -> Result<(), SwitchyardError> {
        SqlResourceOptions::decode(options).map(|_| ())
    }

    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError> {
        let opts = SqlResourceOptions::decode(options)?;
        let config = Self::tds_config(&opts);

        let client = connect_with_timeout(self.config.sql_connect_timeout(), "SQL Server", async {
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| SwitchyardError::ConnectFailed(format!("SQL Server: {}", e)))?;
            tcp.set_nodelay(true).ok();

            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| SwitchyardError::ConnectFailed(format!("SQL Server: {}", e)))
        })
        .await?;

        Ok(Box::new(MssqlSession { client }))
    }
}

struct MssqlSession {
    client: Client<Compat<TcpStream>>,
}

/// Decode a temporal cell through tiberius' chrono conversions
fn temporal<'a, T: FromSql<'a>>(data: &'a ColumnData<'static>, render: impl FnOnce(T) -> String) -> SqlValue {
    T::from_sql(data)
        .ok()
        .flatten()
        .map(|v| SqlValue::Text(render(v)))
        .unwrap_or(SqlValue::Null)
}

/// Convert a TDS cell into a driver-neutral value
fn column_value(data: &ColumnData<'static>) -> SqlValue {
    match data {
        ColumnData::Bit(Some(v)) => SqlValue::Bool(*v),
        ColumnData::U8(Some(v)) => SqlValue::Int((*v).into()),
        ColumnData::I16(Some(v)) => SqlValue::Int((*v).into()),
        ColumnData::I32(Some(v)) => SqlValue::Int((*v).into()),
        ColumnData::I64(Some(v)) => SqlValue::Int(*v),
        ColumnData::F32(Some(v)) => SqlValue::Float((*v).into()),
        ColumnData::F64(Some(v)) => SqlValue::Float(*v),
        ColumnData::String(Some(v)) => SqlValue::Text(v.to_string()),
        ColumnData::Guid(Some(v)) => SqlValue::Uuid(v.into_bytes()),
        ColumnData::Binary(Some(v)) => SqlValue::Bytes(v.to_vec()),
        // DECIMAL/NUMERIC/MONEY keep their exact scale as text
        ColumnData::Numeric(Some(v)) => SqlValue::Text(v.to_string()),
        ColumnData::Xml(Some(v)) => SqlValue::Text(v.to_string()),
        ColumnData::DateTime(Some(_))
        | ColumnData::SmallDateTime(Some(_))
        | ColumnData::DateTime2(Some(_)) => {
            temporal(data, |v: chrono::NaiveDateTime| v.to_string())
        }
        ColumnData::Date(Some(_)) => temporal(data, |v: chrono::NaiveDate| v.to_string()),
        ColumnData::Time(Some(_)) => temporal(data, |v: chrono::NaiveTime| v.to_string()),
        ColumnData::DateTimeOffset(Some(_)) => {
            temporal(data, |v: chrono::DateTime<chrono::FixedOffset>| v.to_rfc3339())
        }
        _ => SqlValue::Null,
    }
}

fn to_cursor(rows: Vec<tiberius::Row>) -> VecCursor {
    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let values = rows
        .into_iter()
        .map(|row| row.into_iter().map(|data| column_value(&data)).collect())
        .collect();

    VecCursor::new(columns, values)
}

fn query_error(e: tiberius::error::Error) -> SwitchyardError {
    SwitchyardError::OperationFailed(format!("SQL Server: {}", e))
}

impl MssqlSession {
    async fn first_result(
        &mut self,
        sql: &str,
        params: &[&dyn tiberius::ToSql],
    ) -> Result<Vec<tiberius::Row>, SwitchyardError> {
        self.client
            .query(sql, params)
            .await
            .map_err(query_error)?
            .into_first_result()
            .await
            .map_err(query_error)
    }
}

#[async_trait]
impl SqlSession for MssqlSession {
    async fn query(&mut self, sql: &str) -> Result<VecCursor, SwitchyardError> {
        let rows = self
            .client
            .simple_query(sql)
            .await
            .map_err(query_error)?
            .into_first_result()
            .await
            .map_err(query_error)?;
        Ok(to_cursor(rows))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SwitchyardError> {
        let result = self.client.execute(sql, &[]).await.map_err(query_error)?;
        Ok(result.total())
    }

    async fn ping(&mut self) -> Result<(), SwitchyardError> {
        self.client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(format!("SQL Server: {}", e)))?
            .into_results()
            .await
            .map(|_| ())
            .map_err(|e| SwitchyardError::ConnectFailed(format!("SQL Server: {}", e)))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, SwitchyardError> {
        let rows = self
            .first_result(
                "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = @P1 ORDER BY TABLE_NAME",
                &[&DEFAULT_SCHEMA],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<&str, _>(0).ok().flatten().map(str::to_string))
            .collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<(String, String)>, SwitchyardError> {
        let rows = self
            .first_result(
                "SELECT COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2 ORDER BY ORDINAL_POSITION",
                &[&DEFAULT_SCHEMA, &table],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let column = row.try_get::<&str, _>(0).ok().flatten()?;
                let data_type = row.try_get::<&str, _>(1).ok().flatten()?;
                Some((column.to_string(), data_type.to_string()))
            })
            .collect())
    }

    async fn close(self: Box<Self>) -> Result<(), SwitchyardError> {
        self.client
            .close()
            .await
            .map_err(|e| SwitchyardError::OperationFailed(format!("SQL Server close: {}", e)))
    }
}
