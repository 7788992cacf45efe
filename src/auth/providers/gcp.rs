//! Google Cloud SQL IAM authentication.

use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::{AuthToken, TokenProvider, Validity};
use crate::{Error, Result};

const PROVIDER: &str = "gcp";

/// Scope requested when none is configured.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Fetches OAuth access tokens from a `gcp_auth` token provider.
///
/// Validity is delegated to the token's own expiry check.
pub struct GcpTokenProvider {
    token_provider: Arc<dyn gcp_auth::TokenProvider>,
    scopes: Vec<String>,
}

impl std::fmt::Debug for GcpTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpTokenProvider")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl GcpTokenProvider {
    pub fn new(token_provider: Arc<dyn gcp_auth::TokenProvider>) -> Self {
        Self {
            token_provider,
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
        }
    }

    /// Application default credentials.
    pub async fn from_default_credentials() -> Result<Self> {
        let token_provider = gcp_auth::provider()
            .await
            .map_err(|e| Error::config(format!("failed to get GCP credentials: {}", e)))?;
        Ok(Self::new(token_provider))
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

#[async_trait]
impl TokenProvider for GcpTokenProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate_token(&self) -> Result<AuthToken> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        let token = self
            .token_provider
            .token(&scopes)
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("fetching gcp token: {}", e)))?;

        let credential = token.as_str().to_string();
        let validity = Validity::Predicate(Arc::new(move || !token.has_expired()));

        Ok(AuthToken::new(credential, validity))
    }
}

/// Check that a GCP token provider has been supplied.
pub fn validate_token_provider(
    token_provider: Option<&Arc<dyn gcp_auth::TokenProvider>>,
) -> Result<()> {
    if token_provider.is_none() {
        return Err(Error::config(
            "gcp credentials are required for GCP authentication",
        ));
    }
    Ok(())
}
