//! Firebase connector: Firestore, Authentication and Realtime Database
//!
//! One connector dispatches on `service`; each service decodes its own
//! `operation` and `options`. All three talk to the REST APIs with an
//! access token minted from the resource's service account.

mod auth;
mod database;
mod firestore;
pub mod value;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use switchyard_core::{RuntimeConfig, SwitchyardError};
use switchyard_types::{ConnectionResult, Options, ResourceType, RuntimeResult, ValidateResult};
use tracing::debug;

use super::common::{http_client, json_response, transport_error};
use super::google::ServiceAccount;
use super::traits::{decode_action, decode_resource, require_resource, Connector};

const SCOPES: &str = "https://www.googleapis.com/auth/cloud-platform \
                      https://www.googleapis.com/auth/datastore \
                      https://www.googleapis.com/auth/firebase.database \
                      https://www.googleapis.com/auth/identitytoolkit \
                      https://www.googleapis.com/auth/userinfo.email";

#[derive(Debug, Clone, Deserialize)]
struct FirebaseOptions {
    #[serde(default, rename = "databaseURL")]
    database_url: String,
    #[serde(default, rename = "projectID")]
    project_id: String,
    #[serde(default, rename = "privateKey")]
    private_key: Value,
}

impl FirebaseOptions {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let opts: Self = decode_resource(options)?;
        require_resource(&opts.project_id, "projectID")?;
        opts.service_account()?;
        Ok(opts)
    }

    fn service_account(&self) -> Result<ServiceAccount, SwitchyardError> {
        if self.private_key.is_null() {
            return Err(SwitchyardError::InvalidResource(
                "privateKey is required".to_string(),
            ));
        }
        ServiceAccount::parse(&self.private_key)
    }
}

/// A Firebase action, tagged by service
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "service", rename_all = "lowercase")]
enum FirebaseAction {
    Firestore {
        operation: firestore::Operation,
        #[serde(default)]
        options: Value,
    },
    Auth {
        operation: auth::Operation,
        #[serde(default)]
        options: Value,
    },
    Database {
        operation: database::Operation,
        #[serde(default)]
        options: Value,
    },
}

impl FirebaseAction {
    fn decode(options: &Options) -> Result<Self, SwitchyardError> {
        let action: Self = decode_action(options)?;
        match &action {
            FirebaseAction::Firestore { operation, options } => {
                firestore::Request::decode(*operation, options)?;
            }
            FirebaseAction::Auth { operation, options } => {
                auth::Request::decode(*operation, options)?;
            }
            FirebaseAction::Database { operation, options } => {
                database::Request::decode(*operation, options)?;
            }
        }
        Ok(action)
    }
}

/// Decode service options, mapping failures to `InvalidAction`
fn decode_options<T: serde::de::DeserializeOwned + Default>(
    options: &Value,
) -> Result<T, SwitchyardError> {
    match options {
        Value::Null => Ok(T::default()),
        Value::String(s) if s.trim().is_empty() => Ok(T::default()),
        Value::String(s) => serde_json::from_str(s)
            .map_err(|e| SwitchyardError::InvalidAction(format!("options: {}", e))),
        other => serde_json::from_value(other.clone())
            .map_err(|e| SwitchyardError::InvalidAction(format!("options: {}", e))),
    }
}

/// Authenticated client for one operation
pub(crate) struct FirebaseSession<'a> {
    client: reqwest::Client,
    token: String,
    project_id: &'a str,
    database_url: &'a str,
    config: &'a RuntimeConfig,
}

impl<'a> FirebaseSession<'a> {
    async fn open(opts: &'a FirebaseOptions, config: &'a RuntimeConfig) -> Result<Self, SwitchyardError> {
        let client = http_client(config)?;
        let token = opts.service_account()?.access_token(&client, SCOPES).await?;
        Ok(Self {
            client,
            token,
            project_id: &opts.project_id,
            database_url: &opts.database_url,
            config,
        })
    }

    /// `<firestore>/projects/<project>/databases/(default)`
    fn firestore_database(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)",
            self.config.endpoints.firestore().trim_end_matches('/'),
            self.project_id
        )
    }

    /// `<identity toolkit>/projects/<project>`
    fn identity_project(&self) -> String {
        format!(
            "{}/projects/{}",
            self.config.endpoints.identity_toolkit().trim_end_matches('/'),
            self.project_id
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, SwitchyardError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error("Firebase", e))?;
        json_response("Firebase", response).await
    }
}

/// Firebase connector
pub struct FirebaseConnector {
    config: Arc<RuntimeConfig>,
}

impl FirebaseConnector {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for FirebaseConnector {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Firebase
    }

    fn validate_resource_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        FirebaseOptions::decode(options)?;
        Ok(ValidateResult::valid())
    }

    fn validate_action_options(&self, options: &Options) -> Result<ValidateResult, SwitchyardError> {
        FirebaseAction::decode(options)?;
        Ok(ValidateResult::valid())
    }

    /// Fetches the Firestore database resource
    async fn test_connection(&self, options: &Options) -> Result<ConnectionResult, SwitchyardError> {
        let opts = FirebaseOptions::decode(options)?;
        let session = FirebaseSession::open(&opts, &self.config).await?;
        session
            .send(session.client.get(session.firestore_database()))
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))?;
        Ok(ConnectionResult::success())
    }

    async fn run(
        &self,
        resource_options: &Options,
        action_options: &Options,
    ) -> Result<RuntimeResult, SwitchyardError> {
        let opts = FirebaseOptions::decode(resource_options)?;
        let action = FirebaseAction::decode(action_options)?;
        if matches!(action, FirebaseAction::Database { .. }) {
            require_resource(&opts.database_url, "databaseURL")?;
        }
        let session = FirebaseSession::open(&opts, &self.config).await?;

        match action {
            FirebaseAction::Firestore { operation, options } => {
                debug!(operation = ?operation, "Firestore request");
                firestore::Request::decode(operation, &options)?.run(&session).await
            }
            FirebaseAction::Auth { operation, options } => {
                debug!(operation = ?operation, "Firebase Auth request");
                auth::Request::decode(operation, &options)?.run(&session).await
            }
            FirebaseAction::Database { operation, options } => {
                debug!(operation = ?operation, "Realtime Database request");
                database::Request::decode(operation, &options)?.run(&session).await
            }
        }
    }
}
