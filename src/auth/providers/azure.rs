//! Azure Database for PostgreSQL authentication with Microsoft Entra ID.
//!
//! Credentials are tried in order, the first one that yields a token wins. The
//! default chain is workload identity followed by managed identity.

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use azure_core::credentials::TokenCredential;
use azure_identity::{
    ManagedIdentityCredential, ManagedIdentityCredentialOptions, UserAssignedId,
    WorkloadIdentityCredential,
};

use crate::auth::{AuthToken, TokenProvider, Validity};
use crate::{Error, Result};

const PROVIDER: &str = "azure";
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Token audience for Azure Database for PostgreSQL.
pub const OSSRDBMS_SCOPE: &str = "https://ossrdbms-aad.database.windows.net/.default";

pub struct AzureTokenProvider {
    credentials: Vec<Arc<dyn TokenCredential>>,
    scope: String,
}

impl std::fmt::Debug for AzureTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureTokenProvider")
            .field("credentials", &self.credentials.len())
            .field("scope", &self.scope)
            .finish()
    }
}

impl AzureTokenProvider {
    pub fn new(credentials: Vec<Arc<dyn TokenCredential>>) -> Result<Self> {
        validate_credentials(&credentials)?;
        Ok(Self {
            credentials,
            scope: OSSRDBMS_SCOPE.to_string(),
        })
    }

    /// Workload identity (when its environment is present), then managed identity.
    pub fn default_chain(client_id: Option<&str>) -> Result<Self> {
        Self::new(default_credentials(client_id)?)
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
}

#[async_trait]
impl TokenProvider for AzureTokenProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate_token(&self) -> Result<AuthToken> {
        let mut errors = Vec::new();

        for (index, credential) in self.credentials.iter().enumerate() {
            match credential.get_token(&[self.scope.as_str()], None).await {
                Ok(access) => {
                    let expires_on = UNIX_EPOCH
                        + Duration::from_secs(access.expires_on.unix_timestamp().max(0) as u64);

                    // Stop handing the token out a minute before Entra ID expires it.
                    return Ok(AuthToken::new(
                        access.token.secret(),
                        Validity::with_margin(expires_on, EXPIRY_MARGIN),
                    ));
                }
                Err(e) => {
                    tracing::debug!(credential = index, error = %e, "azure credential failed");
                    errors.push(e.to_string());
                }
            }
        }

        Err(Error::provider(
            PROVIDER,
            format!("no azure credential produced a token: {}", errors.join("; ")),
        ))
    }
}

/// Build the default credential chain.
pub fn default_credentials(client_id: Option<&str>) -> Result<Vec<Arc<dyn TokenCredential>>> {
    let mut credentials: Vec<Arc<dyn TokenCredential>> = Vec::new();

    match WorkloadIdentityCredential::new(None) {
        Ok(credential) => credentials.push(credential),
        Err(e) => tracing::debug!(error = %e, "workload identity credential unavailable"),
    }

    let options = ManagedIdentityCredentialOptions {
        user_assigned_id: client_id.map(|id| UserAssignedId::ClientId(id.to_string())),
        ..Default::default()
    };
    match ManagedIdentityCredential::new(Some(options)) {
        Ok(credential) => credentials.push(credential),
        Err(e) => tracing::debug!(error = %e, "managed identity credential unavailable"),
    }

    if credentials.is_empty() {
        return Err(Error::config(
            "failed to create Azure credential: no workload or managed identity available",
        ));
    }

    Ok(credentials)
}

/// Check that at least one Azure credential has been supplied.
pub fn validate_credentials(credentials: &[Arc<dyn TokenCredential>]) -> Result<()> {
    if credentials.is_empty() {
        return Err(Error::config(
            "azure credentials are required for Azure authentication",
        ));
    }
    Ok(())
}
