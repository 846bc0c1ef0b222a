//! Google service-account credentials and the Sheets connector
//!
//! A service account mints its own OAuth access token: an RS256 JWT signed
//! with the account's private key is exchanged at `token_uri` using the
//! JWT bearer grant. Tokens are minted per operation and never cached.

mod sheets;

pub use sheets::GoogleSheetsConnector;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchyard_core::SwitchyardError;

use super::common::{json_response, transport_error};

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// The fields of a service-account key file the token exchange needs
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ServiceAccount {
    /// Parse a key file given either as a JSON object or as its text
    pub fn parse(value: &Value) -> Result<Self, SwitchyardError> {
        let account: Self = match value {
            Value::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        }
        .map_err(|e| SwitchyardError::InvalidResource(format!("service account: {}", e)))?;

        if account.client_email.trim().is_empty() || account.private_key.trim().is_empty() {
            return Err(SwitchyardError::InvalidResource(
                "service account needs client_email and private_key".to_string(),
            ));
        }
        EncodingKey::from_rsa_pem(account.private_key.as_bytes()).map_err(|e| {
            SwitchyardError::InvalidResource(format!("service account private_key: {}", e))
        })?;
        Ok(account)
    }

    pub fn token_uri(&self) -> &str {
        if self.token_uri.is_empty() {
            DEFAULT_TOKEN_URI
        } else {
            &self.token_uri
        }
    }

    /// Signed JWT asserting this account for `scopes` (space separated)
    pub fn assertion(&self, scopes: &str) -> Result<String, SwitchyardError> {
        let now = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: scopes,
            aud: self.token_uri(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            SwitchyardError::InvalidResource(format!("service account private_key: {}", e))
        })?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| SwitchyardError::Internal(format!("Failed to sign assertion: {}", e)))
    }

    /// Exchange an assertion for an access token
    pub async fn access_token(
        &self,
        client: &reqwest::Client,
        scopes: &str,
    ) -> Result<String, SwitchyardError> {
        let assertion = self.assertion(scopes)?;
        let response = client
            .post(self.token_uri())
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| transport_error("Google OAuth", e))?;
        let body = json_response("Google OAuth", response)
            .await
            .map_err(|e| SwitchyardError::ConnectFailed(e.to_string()))?;
        let token: TokenResponse = serde_json::from_value(body).map_err(|e| {
            SwitchyardError::ConnectFailed(format!("Google OAuth: unexpected response: {}", e))
        })?;
        Ok(token.access_token)
    }
}
