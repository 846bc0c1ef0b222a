//! SMTP connector backed by lettre's async transport

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{ConnectionResult, Options, ResourceType, RuntimeResult, ValidateResult};
use tracing::debug;

use super::common::{connect_with_timeout, flexible_bool, flexible_port};
use super::traits::{decode_action, decode_resource, require_action, require_resource, Connector};

/// Port on which the server expects TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, Deserialize)]
struct SmtpOptions {
    #[serde(default)]
    host: String,
    #[serde(default, deserialize_with = "flexible_port")]
    port: Option<u16>,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl SmtpOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.host, "host")?;
        if opts.port.is_none() {
            return Err(SwitchyardError::InvalidResource("port is required".to_string()));
        }
        require_resource(&opts.username, "username")?;
        require_resource(&opts.password, "password")?;
        Ok(opts)
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, SwitchyardError> {
        let port = self.port.unwrap_or(IMPLICIT_TLS_PORT);
        let builder = if port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)
                .map_err(|e| SwitchyardError::InvalidResource(format!("SMTP: {}", e)))?
        } else {
            let tls = TlsParameters::new(self.host.clone())
                .map_err(|e| SwitchyardError::InvalidResource(format!("SMTP: {}", e)))?;
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host)
                .tls(Tls::Opportunistic(tls))
        };
        Ok(builder
            .port(port)
            .credentials(Credentials::new(self.username.clone(), self.password.clone()))
            .build())
    }
}

/// Accept one address, a comma-separated list, or an array of addresses
fn address_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let raw: Vec<String> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(serde::de::Error::custom(format!("invalid address: {}", other))),
            })
            .collect::<Result<_, _>>()?,
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "invalid address list: {}",
                other
            )))
        }
    };
    Ok(raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MailAttachment {
    /// Base64 content
    #[serde(default)]
    data: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    content_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SmtpAction {
    #[serde(default)]
    from: String,
    #[serde(default, deserialize_with = "address_list")]
    to: Vec<String>,
    #[serde(default, deserialize_with = "address_list")]
    cc: Vec<String>,
    #[serde(default, deserialize_with = "address_list")]
    bcc: Vec<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    set_reply_to: bool,
    #[serde(default)]
    reply_to: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    content_type: String,
    #[serde(default)]
    attachment: Vec<MailAttachment>,
}

fn mailbox(address: &str, field: &str) -> Result<Mailbox, SwitchyardError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| SwitchyardError::InvalidAction(format!("{}: {}", field, e)))
}

impl SmtpAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        require_action(&action.from, "from")?;
        if action.to.is_empty() {
            return Err(SwitchyardError::InvalidAction("to is required".to_string()));
        }
        if action.set_reply_to {
            require_action(&action.reply_to, "replyTo")?;
        }
        match action.content_type.as_str() {
            "" | "text/plain" | "text/html" => {}
            other => {
                return Err(SwitchyardError::InvalidAction(format!(
                    "contentType must be text/plain or text/html, got {}",
                    other
                )))
            }
        }
        for attachment in &action.attachment {
            require_action(&attachment.name, "attachment.name")?;
        }
        action.message()?;
        Ok(action)
    }

    fn body_type(&self) -> ContentType {
        if self.content_type == "text/html" {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        }
    }

    fn message(&self) -> Result<Message, SwitchyardError> {
        let mut builder = Message::builder()
            .from(mailbox(&self.from, "from")?)
            .subject(self.subject.clone());
        for address in &self.to {
            builder = builder.to(mailbox(address, "to")?);
        }
        for address in &self.cc {
            builder = builder.cc(mailbox(address, "cc")?);
        }
        for address in &self.bcc {
            builder = builder.bcc(mailbox(address, "bcc")?);
        }
        if self.set_reply_to {
            builder = builder.reply_to(mailbox(&self.reply_to, "replyTo")?);
        }

        let built = if self.attachment.is_empty() {
            builder
                .header(self.body_type())
                .body(self.body.clone())
        } else {
            let mut parts = MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(self.body_type())
                    .body(self.body.clone()),
            );
            for attachment in &self.attachment {
                let data = STANDARD.decode(attachment.data.trim()).map_err(|e| {
                    SwitchyardError::InvalidAction(format!(
                        "attachment {} is not base64: {}",
                        attachment.name, e
                    ))
                })?;
                let content_type = if attachment.content_type.is_empty() {
                    ContentType::parse("application/octet-stream")
                } else {
                    ContentType::parse(&attachment.content_type)
                }
                .map_err(|e| {
                    SwitchyardError::InvalidAction(format!("attachment contentType: {}", e))
                })?;
                parts = parts.singlepart(Attachment::new(attachment.name.clone()).body(data, content_type));
            }
            builder.multipart(parts)
        };
        built.map_err(|e| SwitchyardError::InvalidAction(format!("message: {}", e)))
    }
}

/// SMTP connector
pub struct SmtpConnector {
    config: Arc<RuntimeConfig>,
}

impl SmtpConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SmtpConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Smtp
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        SmtpOptions::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        SmtpAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    /// Issues NOOP over a fresh session
    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = SmtpOptions::decode(options)?;
        let transport = opts.transport()?;
        let alive = connect_with_timeout(self.config.sql_connect_timeout(), "SMTP", async {
            transport
                .test_connection()
                .await
                .map_err(|e| SwitchyardError::ConnectFailed(format!("SMTP: {}", e)))
        })
        .await?;
        if !alive {
            return Err(SwitchyardError::ConnectFailed(
                "SMTP server did not answer NOOP".to_string(),
            ));
        }
        Ok(ConnectionResult::success())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = SmtpOptions::decode(resource_options)?;
        let action = SmtpAction::decode(action_options)?;
        let message = action.message()?;

        debug!(
            recipients = action.to.len() + action.cc.len() + action.bcc.len(),
            attachments = action.attachment.len(),
            "Sending mail"
        );
        opts.transport()?
            .send(message)
            .await
            .map_err(|e| SwitchyardError::OperationFailed(format!("SMTP: {}", e)))?;
        Ok(RuntimeResult::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_resource_requires_all_fields() {
        let connector = SmtpConnector::new(Arc::new(RuntimeConfig::default()));
        assert!(connector
            .validate_resource_options(&options(json!({
                "host": "smtp.example.com",
                "port": "587",
                "username": "u",
                "password": "p"
            })))
            .is_ok());
        assert!(matches!(
            connector.validate_resource_options(&options(json!({
                "host": "smtp.example.com",
                "username": "u",
                "password": "p"
            }))),
            Err(SwitchyardError::InvalidResource(m)) if m.contains("port")
        ));
        assert!(matches!(
            connector.validate_resource_options(&options(json!({
                "host": "smtp.example.com",
                "port": 587,
                "username": "u"
            }))),
            Err(SwitchyardError::InvalidResource(m)) if m.contains("password")
        ));
    }

    #[test]
    fn test_message_with_attachment() {
        let action = SmtpAction::decode(&options(json!({
            "from": "Ops <ops@example.com>",
            "to": "a@example.com, b@example.com",
            "bcc": ["audit@example.com"],
            "setReplyTo": true,
            "replyTo": "support@example.com",
            "subject": "Report",
            "body": "<p>See attached</p>",
            "contentType": "text/html",
            "attachment": [{"data": STANDARD.encode("a,b\n1,2"), "name": "report.csv", "contentType": "text/csv"}]
        })))
        .unwrap();
        assert_eq!(action.to, vec!["a@example.com", "b@example.com"]);

        let formatted = String::from_utf8(action.message().unwrap().formatted()).unwrap();
        assert!(formatted.contains("Reply-To: support@example.com"));
        assert!(formatted.contains("text/html"));
        assert!(formatted.contains("report.csv"));
    }

    #[test]
    fn test_action_rejects_bad_input() {
        assert!(matches!(
            SmtpAction::decode(&options(json!({"from": "ops@example.com", "subject": "x"}))),
            Err(SwitchyardError::InvalidAction(m)) if m.contains("to")
        ));
        assert!(matches!(
            SmtpAction::decode(&options(json!({
                "from": "not an address",
                "to": "a@example.com"
            }))),
            Err(SwitchyardError::InvalidAction(m)) if m.contains("from")
        ));
        assert!(matches!(
            SmtpAction::decode(&options(json!({
                "from": "ops@example.com",
                "to": "a@example.com",
                "contentType": "application/pdf"
            }))),
            Err(SwitchyardError::InvalidAction(_))
        ));
    }
}
