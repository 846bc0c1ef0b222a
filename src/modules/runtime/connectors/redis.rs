//! Redis connector (also serves Upstash)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{
    ConnectionResult, Options, ResourceType, Row, RuntimeResult, ValidateResult,
};
use tracing::debug;

use super::common::{connect_with_timeout, flexible_bool, flexible_port, flexible_u64};
use super::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

const DEFAULT_PORT: u16 = 6379;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedisOptions {
    host: String,
    #[serde(default, deserialize_with = "flexible_port")]
    port: Option<u16>,
    #[serde(default, deserialize_with = "flexible_u64")]
    database_index: Option<u64>,
    #[serde(default)]
    database_username: String,
    #[serde(default)]
    database_password: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    ssl: bool,
}

impl RedisOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.host, "host")?;
        Ok(opts)
    }

    /// `redis[s]://[user[:password]@]host:port/db`
    fn url(&self) -> String {
        let scheme = if self.ssl { "rediss" } else { "redis" };
        let credentials = match (
            self.database_username.is_empty(),
            self.database_password.is_empty(),
        ) {
            (true, true) => String::new(),
            (true, false) => format!(":{}@", urlencoding::encode(&self.database_password)),
            (false, true) => format!("{}@", urlencoding::encode(&self.database_username)),
            (false, false) => format!(
                "{}:{}@",
                urlencoding::encode(&self.database_username),
                urlencoding::encode(&self.database_password)
            ),
        };
        format!(
            "{}://{}{}:{}/{}",
            scheme,
            credentials,
            self.host,
            self.port.unwrap_or(DEFAULT_PORT),
            self.database_index.unwrap_or(0)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RedisMode {
    Raw,
    Gui,
}

#[derive(Debug, Clone, Deserialize)]
struct RedisAction {
    mode: RedisMode,
    #[serde(default)]
    query: String,
}

impl RedisAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        if action.mode == RedisMode::Raw {
            require_action(&action.query, "query")?;
            split_command(&action.query)?;
        }
        Ok(action)
    }
}

/// Split a command line into arguments, honouring single and double quotes
///
/// Inside double quotes a backslash escapes the next character; single
/// quotes are literal.
pub fn split_command(line: &str) -> Result<Vec<String>, SwitchyardError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                in_arg = true;
                let quote = c;
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == quote {
                        closed = true;
                        break;
                    }
                    if inner == '\\' && quote == '"' {
                        match chars.next() {
                            Some('n') => current.push('\n'),
                            Some('t') => current.push('\t'),
                            Some(escaped) => current.push(escaped),
                            None => break,
                        }
                    } else {
                        current.push(inner);
                    }
                }
                if !closed {
                    return Err(SwitchyardError::InvalidAction(
                        "unbalanced quotes in command".to_string(),
                    ));
                }
            }
            c if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            c => {
                in_arg = true;
                current.push(c);
            }
        }
    }
    if in_arg {
        args.push(current);
    }

    if args.is_empty() {
        return Err(SwitchyardError::InvalidAction("empty command".to_string()));
    }
    Ok(args)
}

/// Convert a reply to JSON; bulk strings that are not UTF-8 become lossy text
fn reply_to_json(value: redis::Value) -> Value {
    match value {
        redis::Value::Nil => Value::Null,
        redis::Value::Int(i) => json!(i),
        redis::Value::Data(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        redis::Value::Bulk(items) => Value::Array(items.into_iter().map(reply_to_json).collect()),
        redis::Value::Status(status) => Value::String(status),
        redis::Value::Okay => Value::String("OK".to_string()),
    }
}

/// Redis connector; opens one multiplexed connection per operation
pub struct RedisConnector {
    resource_type: ResourceType,
    config: Arc<RuntimeConfig>,
}

impl RedisConnector {
    pub fn new(resource_type: ResourceType, config: Arc<RuntimeConfig>) -> Self {
        Self {
            resource_type,
            config,
        }
    }

    async fn connect(
        &self,
        opts: &RedisOptions,
    ) -> Result<redis::aio::MultiplexedConnection, SwitchyardError> {
        let client = redis::Client::open(opts.url())
            .map_err(|e| SwitchyardError::InvalidResource(format!("Redis: {}", e)))?;

        connect_with_timeout(self.config.sql_connect_timeout(), "Redis", async {
            client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| SwitchyardError::ConnectFailed(format!("Redis: {}", e)))
        })
        .await
    }
}

#[async_trait]
impl Connector for RedisConnector {
    fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        RedisOptions::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        RedisAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = RedisOptions::decode(options)?;
        let mut conn = self.connect(&opts).await?;
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(format!("Redis: {}", e)))?;
        if reply != "PONG" {
            return Err(SwitchyardError::ConnectFailed(format!(
                "Unexpected PING response: {}",
                reply
            )));
        }
        Ok(ConnectionResult::success())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = RedisOptions::decode(resource_options)?;
        let action = RedisAction::decode(action_options)?;
        if action.mode == RedisMode::Gui {
            return Err(SwitchyardError::Unsupported(
                "GUI mode commands must be rendered before dispatch".to_string(),
            ));
        }

        let args = split_command(&action.query)?;
        debug!(command = %args[0].to_uppercase(), "Running Redis command");

        let mut conn = self.connect(&opts).await?;
        let mut command = redis::cmd(&args[0]);
        for arg in &args[1..] {
            command.arg(arg);
        }
        let reply: redis::Value = command
            .query_async(&mut conn)
            .await
            .map_err(|e| SwitchyardError::OperationFailed(format!("Redis: {}", e)))?;

        let mut row = Row::new();
        row.insert("result".to_string(), reply_to_json(reply));
        Ok(RuntimeResult::single(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_split_command_quotes() {
        assert_eq!(
            split_command(r#"SET greeting "hello world""#).unwrap(),
            vec!["SET", "greeting", "hello world"]
        );
        assert_eq!(
            split_command(r#"SET k 'it\s literal'"#).unwrap(),
            vec!["SET", "k", r"it\s literal"]
        );
        assert_eq!(
            split_command(r#"SET k "say \"hi\"""#).unwrap(),
            vec!["SET", "k", r#"say "hi""#]
        );
        assert_eq!(split_command(r#"SET k """#).unwrap(), vec!["SET", "k", ""]);
        assert!(split_command("  ").is_err());
        assert!(split_command(r#"GET "open"#).is_err());
    }

    #[test]
    fn test_url() {
        let opts = RedisOptions::decode(&options(json!({
            "host": "cache",
            "port": "6380",
            "databaseIndex": "2",
            "databasePassword": "p@ss",
            "ssl": true
        })))
        .unwrap();
        assert_eq!(opts.url(), "rediss://:p%40ss@cache:6380/2");
    }

    #[test]
    fn test_reply_to_json() {
        let reply = redis::Value::Bulk(vec![
            redis::Value::Data(b"a".to_vec()),
            redis::Value::Int(3),
            redis::Value::Nil,
            redis::Value::Okay,
        ]);
        assert_eq!(reply_to_json(reply), json!(["a", 3, null, "OK"]));
    }

    #[test]
    fn test_validation() {
        let connector = RedisConnector::new(ResourceType::Upstash, Arc::new(RuntimeConfig::default()));
        assert!(connector
            .validate_action_options(&options(json!({"mode": "raw", "query": "GET k"})))
            .is_ok());
        assert!(matches!(
            connector.validate_action_options(&options(json!({"mode": "raw", "query": ""}))),
            Err(SwitchyardError::InvalidAction(_))
        ));
        assert!(matches!(
            connector.validate_resource_options(&options(json!({"port": 6379}))),
            Err(SwitchyardError::InvalidResource(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis instance
    async fn test_redis_roundtrip() {
        let connector = RedisConnector::new(ResourceType::Redis, Arc::new(RuntimeConfig::default()));
        let resource = options(json!({"host": "localhost"}));
        connector.test_connection(&resource).await.unwrap();
        connector
            .run(&resource, &options(json!({"mode": "raw", "query": "SET greeting \"hi there\""})))
            .await
            .unwrap();
        let result = connector
            .run(&resource, &options(json!({"mode": "raw", "query": "GET greeting"})))
            .await
            .unwrap();
        assert_eq!(result.rows[0]["result"], json!("hi there"));
    }
}
