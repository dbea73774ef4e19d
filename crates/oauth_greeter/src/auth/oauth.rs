use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::client::JsonClient;
use crate::config::{ConfigError, Credentials};
use crate::error::Result;

pub const AUTHORIZE_PATH: &str = "/login/oauth/authorize";
pub const TOKEN_PATH: &str = "/login/oauth/access_token";
pub const USER_PATH: &str = "/api/v3/user";

/// OAuth provider configuration
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub credentials: Credentials,
    /// Host serving the authorize, token and user endpoints
    pub provider_host: String,
    authorize_url: url::Url,
}

impl OAuthConfig {
    pub fn new(
        credentials: Credentials,
        provider_host: impl Into<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let provider_host = provider_host.into();
        let mut authorize_url = url::Url::parse(&format!("https://{}{}", provider_host, AUTHORIZE_PATH))
            .map_err(|e| ConfigError::Invalid(format!("provider host {:?}: {}", provider_host, e)))?;
        authorize_url
            .query_pairs_mut()
            .append_pair("client_id", &credentials.client_id);

        Ok(Self {
            credentials,
            provider_host,
            authorize_url,
        })
    }

    /// Point the consent link at plain HTTP, for a local stub provider.
    pub fn plaintext(mut self) -> Self {
        // https -> http cannot fail: both are special schemes.
        let _ = self.authorize_url.set_scheme("http");
        self
    }

    /// Link the user follows to grant access to this application.
    pub fn authorization_url(&self) -> String {
        self.authorize_url.to_string()
    }
}

/// What the token endpoint said. `access_token` is absent when the exchange
/// failed; `raw` is kept for the diagnostic response.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub raw: Value,
}

impl From<Value> for TokenResponse {
    fn from(raw: Value) -> Self {
        let access_token = non_empty_str(&raw, "access_token");
        Self { access_token, raw }
    }
}

/// What the identity endpoint said about the token's owner.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRecord {
    pub login: Option<String>,
    pub raw: Value,
}

impl From<Value> for IdentityRecord {
    fn from(raw: Value) -> Self {
        let login = non_empty_str(&raw, "login");
        Self { login, raw }
    }
}

fn non_empty_str(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The provider calls the handshake needs.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL of the provider's consent page for this application.
    fn authorization_url(&self) -> String;

    /// Trade an authorization code for an access token.
    async fn exchange_code(&self, code: &str, deadline: Instant) -> Result<TokenResponse>;

    /// Ask who owns `access_token`.
    async fn fetch_identity(&self, access_token: &str, deadline: Instant)
        -> Result<IdentityRecord>;
}

/// OAuth client for the configured provider
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    json_client: JsonClient,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig, json_client: JsonClient) -> Self {
        Self {
            config,
            json_client,
        }
    }
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    fn authorization_url(&self) -> String {
        self.config.authorization_url()
    }

    async fn exchange_code(&self, code: &str, deadline: Instant) -> Result<TokenResponse> {
        #[derive(Serialize)]
        struct TokenRequest<'a> {
            client_id: &'a str,
            client_secret: &'a str,
            code: &'a str,
        }

        let request = TokenRequest {
            client_id: &self.config.credentials.client_id,
            client_secret: &self.config.credentials.client_secret,
            code,
        };

        tracing::debug!(
            "Exchanging code for token: client_id={}",
            self.config.credentials.client_id
        );

        let raw = self
            .json_client
            .post_json_until(&self.config.provider_host, TOKEN_PATH, &request, deadline)
            .await?;

        Ok(TokenResponse::from(raw))
    }

    async fn fetch_identity(
        &self,
        access_token: &str,
        deadline: Instant,
    ) -> Result<IdentityRecord> {
        let token: String = url::form_urlencoded::byte_serialize(access_token.as_bytes()).collect();
        let path = format!("{}?access_token={}", USER_PATH, token);

        let raw = self
            .json_client
            .get_json_until(&self.config.provider_host, &path, deadline)
            .await?;

        Ok(IdentityRecord::from(raw))
    }
}
