//! Snowflake dialect over the SQL REST API (`/api/v2/statements`)
//!
//! Requests are authenticated with a key-pair JWT: the issuer is
//! `<ACCOUNT>.<USER>.SHA256:<fingerprint>` where the fingerprint is the
//! base64 SHA-256 digest of the DER-encoded public key.

use async_trait::async_trait;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{Options, ResourceType};
use tracing::debug;

use super::{SqlDriver, SqlSession, SqlValue, VecCursor};
use crate::connectors::common::{http_client, json_response, transport_error};
use crate::connectors::traits::{decode_resource, require_resource};

const TOKEN_LIFETIME_SECS: i64 = 3540;
const STATEMENT_TIMEOUT_SECS: u64 = 60;
const POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_SCHEMA: &str = "PUBLIC";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum AuthMode {
    Basic,
    #[default]
    KeyPair,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnowflakeOptions {
    account_name: String,
    /// Overrides `https://<account>.snowflakecomputing.com`
    #[serde(default)]
    host: String,
    #[serde(default)]
    database_username: String,
    #[serde(default)]
    database_name: String,
    #[serde(default)]
    schema: String,
    #[serde(default)]
    warehouse: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    authentication: AuthMode,
    #[serde(default)]
    private_key: String,
}

impl SnowflakeOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.account_name, "accountName")?;
        require_resource(&opts.database_username, "databaseUsername")?;
        if opts.authentication == AuthMode::KeyPair {
            require_resource(&opts.private_key, "privateKey")?;
        }
        Ok(opts)
    }

    fn base_url(&self) -> String {
        if self.host.trim().is_empty() {
            format!("https://{}.snowflakecomputing.com", self.account_name)
        } else {
            self.host.trim_end_matches('/').to_string()
        }
    }
}

#[derive(Debug, Serialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: i64,
    exp: i64,
}

/// Mint a key-pair JWT for `account` and `user`
fn keypair_jwt(account: &str, user: &str, private_key_pem: &str) -> Result<String, SwitchyardError> {
    let invalid = |e: String| SwitchyardError::InvalidResource(format!("privateKey: {}", e));

    let private_key = RsaPrivateKey::from_pkcs8_pem(private_key_pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_key_pem))
        .map_err(|e| invalid(e.to_string()))?;
    let public_der = private_key
        .to_public_key()
        .to_public_key_der()
        .map_err(|e| invalid(e.to_string()))?;
    let fingerprint =
        base64::engine::general_purpose::STANDARD.encode(Sha256::digest(public_der.as_bytes()));

    // Region-qualified locators drop everything after the first dot
    let account = account
        .split('.')
        .next()
        .unwrap_or(account)
        .to_uppercase();
    let user = user.to_uppercase();

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        iss: format!("{}.{}.SHA256:{}", account, user, fingerprint),
        sub: format!("{}.{}", account, user),
        iat: now,
        exp: now + TOKEN_LIFETIME_SECS,
    };

    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).map_err(|e| invalid(e.to_string()))?;
    encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| SwitchyardError::Internal(format!("Failed to sign Snowflake JWT: {}", e)))
}

/// Snowflake driver; a session is an authenticated HTTP client
pub struct SnowflakeDriver {
    config: Arc<RuntimeConfig>,
}

impl SnowflakeDriver {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SqlDriver for SnowflakeDriver {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Snowflake
    }

    fn validate_resource(&self, options: &Options) -> Result<(), SwitchyardError> {
        SnowflakeOptions::decode(options).map(|_| ())
    }

    async fn open(&self, options: &Options) -> Result<Box<dyn SqlSession>, SwitchyardError> {
        let opts = SnowflakeOptions::decode(options)?;
        if opts.authentication == AuthMode::Basic {
            return Err(SwitchyardError::Unsupported(
                "Snowflake password authentication is not available over the SQL API; use keyPair"
                    .to_string(),
            ));
        }

        let token = keypair_jwt(&opts.account_name, &opts.database_username, &opts.private_key)?;
        Ok(Box::new(SnowflakeSession {
            client: http_client(&self.config)?,
            base_url: opts.base_url(),
            token,
            opts,
        }))
    }
}

struct SnowflakeSession {
    client: reqwest::Client,
    base_url: String,
    token: String,
    opts: SnowflakeOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnType {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    scale: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Stats {
    #[serde(default)]
    num_rows_inserted: u64,
    #[serde(default)]
    num_rows_updated: u64,
    #[serde(default)]
    num_rows_deleted: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: ResultSetMetaData,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    #[serde(default)]
    stats: Option<Stats>,
    #[serde(default)]
    statement_handle: String,
}

/// The SQL API returns every cell as text; re-type it from the column metadata
fn cell_value(column: &ColumnType, cell: Option<String>) -> SqlValue {
    let Some(text) = cell else {
        return SqlValue::Null;
    };
    match column.kind.as_str() {
        "fixed" if column.scale.unwrap_or(0) == 0 => text
            .parse::<i64>()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Text(text)),
        "fixed" | "real" => text
            .parse::<f64>()
            .map(SqlValue::Float)
            .unwrap_or(SqlValue::Text(text)),
        "boolean" => SqlValue::Bool(text.eq_ignore_ascii_case("true")),
        "object" | "array" | "variant" => serde_json::from_str(&text)
            .map(SqlValue::Json)
            .unwrap_or(SqlValue::Text(text)),
        _ => SqlValue::Text(text),
    }
}

impl StatementResponse {
    fn into_cursor(self) -> VecCursor {
        let row_type = self.result_set_meta_data.row_type;
        let columns = row_type.iter().map(|c| c.name.clone()).collect();
        let rows = self
            .data
            .into_iter()
            .map(|cells| {
                row_type
                    .iter()
                    .zip(cells)
                    .map(|(column, cell)| cell_value(column, cell))
                    .collect()
            })
            .collect();
        VecCursor::new(columns, rows)
    }

    fn affected_rows(&self) -> u64 {
        match &self.stats {
            Some(stats) => stats.num_rows_inserted + stats.num_rows_updated + stats.num_rows_deleted,
            // DML without stats reports its counts as the single result row
            None => self
                .data
                .first()
                .map(|row| {
                    row.iter()
                        .flatten()
                        .filter_map(|cell| cell.parse::<u64>().ok())
                        .sum()
                })
                .unwrap_or(0),
        }
    }
}

impl SnowflakeSession {
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT")
            .header("Accept", "application/json")
    }

    fn context(&self, statement: &str, bindings: &[&str]) -> Value {
        let mut body = json!({
            "statement": statement,
            "timeout": STATEMENT_TIMEOUT_SECS,
        });
        for (field, value) in [
            ("database", &self.opts.database_name),
            ("schema", &self.opts.schema),
            ("warehouse", &self.opts.warehouse),
            ("role", &self.opts.role),
        ] {
            if !value.is_empty() {
                body[field] = json!(value.to_uppercase());
            }
        }
        if !bindings.is_empty() {
            let bound: serde_json::Map<String, Value> = bindings
                .iter()
                .enumerate()
                .map(|(i, value)| ((i + 1).to_string(), json!({"type": "TEXT", "value": value})))
                .collect();
            body["bindings"] = Value::Object(bound);
        }
        body
    }

    async fn statement(&self, sql: &str, bindings: &[&str]) -> Result<StatementResponse, SwitchyardError> {
        debug!(account = %self.opts.account_name, "Submitting Snowflake statement");
        let response = self
            .authorize(self.client.post(format!("{}/api/v2/statements", self.base_url)))
            .json(&self.context(sql, bindings))
            .send()
            .await
            .map_err(|e| transport_error("Snowflake", e))?;

        let mut pending = response.status() == reqwest::StatusCode::ACCEPTED;
        let mut body = json_response("Snowflake", response).await?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(STATEMENT_TIMEOUT_SECS);
        while pending {
            if tokio::time::Instant::now() >= deadline {
                return Err(SwitchyardError::OperationFailed(
                    "Snowflake statement did not finish in time".to_string(),
                ));
            }
            let handle = body
                .get("statementHandle")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            tokio::time::sleep(POLL_INTERVAL).await;

            let response = self
                .authorize(
                    self.client
                        .get(format!("{}/api/v2/statements/{}", self.base_url, handle)),
                )
                .send()
                .await
                .map_err(|e| transport_error("Snowflake", e))?;
            pending = response.status() == reqwest::StatusCode::ACCEPTED;
            body = json_response("Snowflake", response).await?;
        }

        if body.is_null() {
            return Ok(StatementResponse::default());
        }
        let parsed: StatementResponse = serde_json::from_value(body)
            .map_err(|e| SwitchyardError::OperationFailed(format!("Snowflake: {}", e)))?;
        debug!(handle = %parsed.statement_handle, "Snowflake statement finished");
        Ok(parsed)
    }

    fn schema(&self) -> String {
        if self.opts.schema.is_empty() {
            DEFAULT_SCHEMA.to_string()
        } else {
            self.opts.schema.to_uppercase()
        }
    }
}

#[async_trait]
impl SqlSession for SnowflakeSession {
    async fn query(&mut self, sql: &str) -> Result<VecCursor, SwitchyardError> {
        Ok(self.statement(sql, &[]).await?.into_cursor())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, SwitchyardError> {
        Ok(self.statement(sql, &[]).await?.affected_rows())
    }

    async fn ping(&mut self) -> Result<(), SwitchyardError> {
        self.statement("SELECT 1", &[])
            .await
            .map(|_| ())
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, SwitchyardError> {
        let schema = self.schema();
        let response = self
            .statement(
                "SELECT table_name FROM information_schema.tables WHERE table_schema = ? ORDER BY table_name",
                &[&schema],
            )
            .await?;
        Ok(response
            .data
            .into_iter()
            .filter_map(|row| row.into_iter().next().flatten())
            .collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<(String, String)>, SwitchyardError> {
        let schema = self.schema();
        let response = self
            .statement(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
                &[&schema, table],
            )
            .await?;
        Ok(response
            .data
            .into_iter()
            .filter_map(|row| {
                let mut cells = row.into_iter();
                Some((cells.next().flatten()?, cells.next().flatten()?))
            })
            .collect())
    }

    async fn close(self: Box<Self>) -> Result<(), SwitchyardError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::sql::rows_to_mappings;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY: &str = include_str!("../../tests/fixtures/test_rsa_key.pem");

    fn resource(host: &str) -> Options {
        json!({
            "accountName": "xy12345.eu-west-1",
            "host": host,
            "databaseUsername": "loader",
            "databaseName": "analytics",
            "warehouse": "compute_wh",
            "privateKey": TEST_KEY
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_jwt_claims() {
        let token = keypair_jwt("xy12345.eu-west-1", "loader", TEST_KEY).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .unwrap();
        let claims: Value = serde_json::from_slice(&decoded).unwrap();
        assert!(claims["iss"]
            .as_str()
            .unwrap()
            .starts_with("XY12345.LOADER.SHA256:"));
        assert_eq!(claims["sub"], json!("XY12345.LOADER"));
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            TOKEN_LIFETIME_SECS
        );
    }

    #[test]
    fn test_validate_requires_private_key() {
        let driver = SnowflakeDriver::new(Arc::new(RuntimeConfig::default()));
        let mut options = resource("");
        options.remove("privateKey");
        assert!(matches!(
            driver.validate_resource(&options),
            Err(SwitchyardError::InvalidResource(m)) if m.contains("privateKey")
        ));

        options.insert("authentication".into(), json!("basic"));
        assert!(driver.validate_resource(&options).is_ok());
    }

    #[tokio::test]
    async fn test_basic_auth_is_unsupported() {
        let driver = SnowflakeDriver::new(Arc::new(RuntimeConfig::default()));
        let mut options = resource("");
        options.insert("authentication".into(), json!("basic"));
        let err = driver.open(&options).await.err().unwrap();
        assert!(matches!(err, SwitchyardError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_statement_rows_are_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/statements"))
            .and(header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statementHandle": "01b2",
                "resultSetMetaData": {
                    "rowType": [
                        {"name": "ID", "type": "fixed", "scale": 0},
                        {"name": "PRICE", "type": "fixed", "scale": 2},
                        {"name": "NAME", "type": "text"}
                    ]
                },
                "data": [["1", "9.50", "widget"], ["2", null, "gadget"]]
            })))
            .mount(&server)
            .await;

        let driver = SnowflakeDriver::new(Arc::new(RuntimeConfig::default()));
        let mut session = driver.open(&resource(&server.uri())).await.unwrap();
        let mut cursor = session.query("SELECT id, price, name FROM items").await.unwrap();
        let rows = rows_to_mappings(&mut cursor);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ID"], json!(1));
        assert_eq!(rows[0]["PRICE"], json!(9.5));
        assert_eq!(rows[1]["PRICE"], Value::Null);
        assert_eq!(rows[1]["NAME"], json!("gadget"));
    }

    #[test]
    fn test_affected_rows_from_stats() {
        let response: StatementResponse = serde_json::from_value(json!({
            "stats": {"numRowsInserted": 2, "numRowsUpdated": 1}
        }))
        .unwrap();
        assert_eq!(response.affected_rows(), 3);

        let response: StatementResponse = serde_json::from_value(json!({
            "data": [["4"]]
        }))
        .unwrap();
        assert_eq!(response.affected_rows(), 4);
    }
}
