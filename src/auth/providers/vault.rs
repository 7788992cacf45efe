//! HashiCorp Vault database secrets engine.
//!
//! Reads a dynamic credential pair (`data.username`, `data.password`) over the
//! Vault HTTP API. The lease duration bounds how long the pair is handed out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::auth::{AuthToken, TokenProvider, Validity};
use crate::{Error, Result};

const PROVIDER: &str = "vault";
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const TOKEN_HEADER: &str = "X-Vault-Token";

/// Where and how to read database credentials from Vault.
#[derive(Clone)]
pub struct VaultConfig {
    pub address: String,
    pub token: SecretString,
    /// Logical path, e.g. `database/creds/app`.
    pub secret_path: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("token", &"[REDACTED]")
            .field("secret_path", &self.secret_path)
            .finish()
    }
}

impl VaultConfig {
    pub fn new(
        address: impl Into<String>,
        token: impl Into<String>,
        secret_path: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            token: SecretString::from(token.into()),
            secret_path: secret_path.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::config("vault address is required for Vault authentication"));
        }
        if self.token.expose_secret().is_empty() {
            return Err(Error::config("vault token is required for Vault authentication"));
        }
        if self.secret_path.trim().is_empty() {
            return Err(Error::config(
                "vault secret path is required for Vault authentication",
            ));
        }
        Ok(())
    }

    fn secret_url(&self) -> String {
        format!(
            "{}/v1/{}",
            self.address.trim_end_matches('/'),
            self.secret_path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct SecretResponse {
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    data: Option<SecretData>,
}

#[derive(Debug, Deserialize)]
struct SecretData {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug)]
pub struct VaultTokenProvider {
    config: VaultConfig,
    http: reqwest::Client,
}

impl VaultTokenProvider {
    pub fn new(config: VaultConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("failed to create vault client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    async fn read_secret(&self) -> Result<SecretResponse> {
        let response = self
            .http
            .get(self.config.secret_url())
            .header(TOKEN_HEADER, self.config.token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                Error::provider(PROVIDER, format!("failed to read secret from vault: {}", e))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::provider(
                PROVIDER,
                format!("no secret found at path: {}", self.config.secret_path),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(
                PROVIDER,
                format!("failed to read secret from vault: HTTP {}: {}", status, body),
            ));
        }

        response.json::<SecretResponse>().await.map_err(|e| {
            Error::provider(PROVIDER, format!("invalid vault secret response: {}", e))
        })
    }
}

#[async_trait]
impl TokenProvider for VaultTokenProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate_token(&self) -> Result<AuthToken> {
        let secret = self.read_secret().await?;
        let data = secret.data.ok_or_else(|| {
            Error::provider(
                PROVIDER,
                format!("no secret found at path: {}", self.config.secret_path),
            )
        })?;

        let password = data.password.ok_or_else(|| {
            Error::provider(PROVIDER, "failed to get password from secret data")
        })?;
        let username = data.username.ok_or_else(|| {
            Error::provider(PROVIDER, "failed to get username from secret data")
        })?;

        let validity = Validity::for_lifetime(
            Duration::from_secs(secret.lease_duration),
            EXPIRY_MARGIN,
        );

        Ok(AuthToken::new(password, validity).with_username(username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> VaultTokenProvider {
        VaultTokenProvider::new(VaultConfig::new(
            server.uri(),
            "root-token",
            "database/creds/app",
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_reads_dynamic_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/database/creds/app"))
            .and(header("X-Vault-Token", "root-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_id": "database/creds/app/abc",
                "lease_duration": 3600,
                "renewable": true,
                "data": { "username": "v-app-xyz", "password": "A1a-generated" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = provider_for(&server).generate_token().await.unwrap();
        assert_eq!(token.expose(), "A1a-generated");
        assert_eq!(token.username(), Some("v-app-xyz"));
        assert!(token.is_valid());
    }

    #[tokio::test]
    async fn test_short_lease_is_already_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_duration": 30,
                "data": { "username": "u", "password": "p" }
            })))
            .mount(&server)
            .await;

        let token = provider_for(&server).generate_token().await.unwrap();
        assert!(!token.is_valid());
    }

    #[tokio::test]
    async fn test_missing_secret() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate_token().await.unwrap_err();
        assert!(err.to_string().contains("no secret found at path: database/creds/app"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_password() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_duration": 3600,
                "data": { "username": "u" }
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate_token().await.unwrap_err();
        assert!(err.to_string().contains("failed to get password"));
    }

    #[test]
    fn test_config_validation() {
        let err = VaultConfig::new("", "t", "p").validate().unwrap_err();
        assert!(err.to_string().contains("vault address is required"));

        let err = VaultConfig::new("http://vault:8200", "", "p").validate().unwrap_err();
        assert!(err.to_string().contains("vault token is required"));

        assert!(VaultConfig::new("http://vault:8200", "t", "db/creds/x").validate().is_ok());
    }

    #[test]
    fn test_secret_url_joins_cleanly() {
        let config = VaultConfig::new("http://vault:8200/", "t", "/database/creds/app");
        assert_eq!(config.secret_url(), "http://vault:8200/v1/database/creds/app");
    }

    #[test]
    fn test_debug_hides_token() {
        let config = VaultConfig::new("http://vault:8200", "hvs.secret", "p");
        assert!(!format!("{:?}", config).contains("hvs.secret"));
    }
}
