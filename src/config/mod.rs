//! Connection and identity configuration.
//!
//! ```rust,no_run
//! use pg_iam_auth::{Config, RetryConfig, VaultConfig};
//!
//! let config = Config::new("postgres://app@db.internal:5432/app")
//!     .with_vault(VaultConfig::new("https://vault:8200", "hvs.token", "database/creds/app"))
//!     .with_retry(RetryConfig::default().with_max_attempts(5));
//! config.validate().unwrap();
//! ```

mod defaults;
pub mod env;
mod method;

pub use crate::auth::VaultConfig;
pub use defaults::{DefaultAuthOptions, default_config};
pub use method::AuthMethod;

use std::sync::Arc;

use crate::auth::TokenProvider;
use crate::observability::{RetrySink, TracingSink};
use crate::retry::{RetryConfig, RetryingFetcher};
use crate::{Error, Result};

/// Everything needed to open authenticated connections to one database.
///
/// Builder methods that attach an identity source also select the matching
/// [`AuthMethod`]; `with_auth_method` overrides that choice.
#[derive(Clone)]
pub struct Config {
    conn_string: String,
    auth_method: AuthMethod,
    #[cfg(feature = "aws")]
    aws_config: Option<aws_config::SdkConfig>,
    #[cfg(feature = "gcp")]
    gcp_provider: Option<Arc<dyn gcp_auth::TokenProvider>>,
    #[cfg(feature = "azure")]
    azure_credentials: Vec<Arc<dyn azure_core::credentials::TokenCredential>>,
    vault: Option<VaultConfig>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    retry: RetryConfig,
    retry_sink: Arc<dyn RetrySink>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("conn_string", &"[REDACTED]")
            .field("auth_method", &self.auth_method)
            .field("vault", &self.vault)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn new(conn_string: impl Into<String>) -> Self {
        Self {
            conn_string: conn_string.into(),
            auth_method: AuthMethod::Standard,
            #[cfg(feature = "aws")]
            aws_config: None,
            #[cfg(feature = "gcp")]
            gcp_provider: None,
            #[cfg(feature = "azure")]
            azure_credentials: Vec::new(),
            vault: None,
            token_provider: None,
            retry: RetryConfig::default(),
            retry_sink: Arc::new(TracingSink),
        }
    }

    #[cfg(feature = "aws")]
    pub fn with_aws_config(mut self, sdk_config: aws_config::SdkConfig) -> Self {
        self.aws_config = Some(sdk_config);
        self.auth_method = AuthMethod::Aws;
        self
    }

    #[cfg(feature = "gcp")]
    pub fn with_gcp_provider(mut self, provider: Arc<dyn gcp_auth::TokenProvider>) -> Self {
        self.gcp_provider = Some(provider);
        self.auth_method = AuthMethod::Gcp;
        self
    }

    /// Append a credential to the Azure chain; earlier credentials are tried first.
    #[cfg(feature = "azure")]
    pub fn with_azure_credential(
        mut self,
        credential: Arc<dyn azure_core::credentials::TokenCredential>,
    ) -> Self {
        self.azure_credentials.push(credential);
        self.auth_method = AuthMethod::Azure;
        self
    }

    pub fn with_vault(mut self, vault: VaultConfig) -> Self {
        self.vault = Some(vault);
        self.auth_method = AuthMethod::Vault;
        self
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self.auth_method = AuthMethod::Custom;
        self
    }

    pub fn with_auth_method(mut self, method: AuthMethod) -> Self {
        self.auth_method = method;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_retry_sink(mut self, sink: Arc<dyn RetrySink>) -> Self {
        self.retry_sink = sink;
        self
    }

    pub fn conn_string(&self) -> &str {
        &self.conn_string
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    /// True when connections use a token instead of the connection string's password.
    pub fn auth_configured(&self) -> bool {
        self.auth_method.uses_token()
    }

    #[cfg(feature = "aws")]
    pub fn aws_config(&self) -> Option<&aws_config::SdkConfig> {
        self.aws_config.as_ref()
    }

    #[cfg(feature = "gcp")]
    pub fn gcp_provider(&self) -> Option<&Arc<dyn gcp_auth::TokenProvider>> {
        self.gcp_provider.as_ref()
    }

    #[cfg(feature = "azure")]
    pub fn azure_credentials(&self) -> &[Arc<dyn azure_core::credentials::TokenCredential>] {
        &self.azure_credentials
    }

    pub fn vault(&self) -> Option<&VaultConfig> {
        self.vault.as_ref()
    }

    pub fn token_provider(&self) -> Option<&Arc<dyn TokenProvider>> {
        self.token_provider.as_ref()
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Fetcher carrying this config's retry policy and sink.
    pub fn fetcher(&self) -> RetryingFetcher {
        RetryingFetcher::new(self.retry.clone()).with_sink(self.retry_sink.clone())
    }

    /// Check the connection string and the selected method's requirements.
    ///
    /// Makes no network calls.
    pub fn validate(&self) -> Result<()> {
        if self.conn_string.trim().is_empty() {
            return Err(Error::config("connection string cannot be empty"));
        }

        match self.auth_method {
            AuthMethod::Standard => Ok(()),
            AuthMethod::Aws => self.validate_aws(),
            AuthMethod::Gcp => self.validate_gcp(),
            AuthMethod::Azure => self.validate_azure(),
            AuthMethod::Vault => match self.vault {
                Some(ref vault) => vault.validate().map_err(|e| nested("Vault", e)),
                None => Err(nested(
                    "Vault",
                    Error::config("vault config is required for Vault authentication"),
                )),
            },
            AuthMethod::Custom => match self.token_provider {
                Some(_) => Ok(()),
                None => Err(Error::config(
                    "token provider is required for custom authentication",
                )),
            },
        }
    }

    #[cfg(feature = "aws")]
    fn validate_aws(&self) -> Result<()> {
        crate::auth::providers::aws::validate_sdk_config(self.aws_config.as_ref())
            .map_err(|e| nested("AWS", e))
    }

    #[cfg(not(feature = "aws"))]
    fn validate_aws(&self) -> Result<()> {
        Err(feature_disabled(AuthMethod::Aws, "aws"))
    }

    #[cfg(feature = "gcp")]
    fn validate_gcp(&self) -> Result<()> {
        crate::auth::providers::gcp::validate_token_provider(self.gcp_provider.as_ref())
            .map_err(|e| nested("GCP", e))
    }

    #[cfg(not(feature = "gcp"))]
    fn validate_gcp(&self) -> Result<()> {
        Err(feature_disabled(AuthMethod::Gcp, "gcp"))
    }

    #[cfg(feature = "azure")]
    fn validate_azure(&self) -> Result<()> {
        crate::auth::providers::azure::validate_credentials(&self.azure_credentials)
            .map_err(|e| nested("Azure", e))
    }

    #[cfg(not(feature = "azure"))]
    fn validate_azure(&self) -> Result<()> {
        Err(feature_disabled(AuthMethod::Azure, "azure"))
    }
}

fn nested(source: &str, err: Error) -> Error {
    match err {
        Error::Config(message) => Error::config(format!("invalid {} config: {}", source, message)),
        other => other,
    }
}

#[cfg(not(all(feature = "aws", feature = "gcp", feature = "azure")))]
fn feature_disabled(method: AuthMethod, feature: &str) -> Error {
    Error::config(format!(
        "{} authentication requires the `{}` cargo feature",
        method, feature
    ))
}
