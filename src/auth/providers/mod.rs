//! Token provider implementations, one per identity source.

#[cfg(feature = "aws")]
pub(crate) mod aws;
#[cfg(feature = "azure")]
pub(crate) mod azure;
mod explicit;
#[cfg(feature = "gcp")]
pub(crate) mod gcp;
mod vault;

#[cfg(feature = "aws")]
pub use aws::AwsTokenProvider;
#[cfg(feature = "azure")]
pub use azure::{AzureTokenProvider, OSSRDBMS_SCOPE};
pub use explicit::StaticTokenProvider;
#[cfg(feature = "gcp")]
pub use gcp::{CLOUD_PLATFORM_SCOPE, GcpTokenProvider};
pub use vault::{VaultConfig, VaultTokenProvider};

use std::sync::Arc;

use super::TokenProvider;
use crate::config::{AuthMethod, Config};
use crate::{Error, Result};

/// Provider for the config's selected method, or `None` for standard auth.
///
/// The config must already be validated.
pub fn build_provider(config: &Config) -> Result<Option<Arc<dyn TokenProvider>>> {
    let provider: Arc<dyn TokenProvider> = match config.auth_method() {
        AuthMethod::Standard => return Ok(None),
        AuthMethod::Aws => aws_provider(config)?,
        AuthMethod::Gcp => gcp_provider(config)?,
        AuthMethod::Azure => azure_provider(config)?,
        AuthMethod::Vault => {
            let vault = config
                .vault()
                .cloned()
                .ok_or_else(|| Error::config("vault config is required for Vault authentication"))?;
            Arc::new(VaultTokenProvider::new(vault)?)
        }
        AuthMethod::Custom => config
            .token_provider()
            .cloned()
            .ok_or_else(|| Error::config("token provider is required for custom authentication"))?,
    };

    tracing::debug!(
        method = %config.auth_method(),
        provider = provider.name(),
        "built token provider"
    );
    Ok(Some(provider))
}

#[cfg(feature = "aws")]
fn aws_provider(config: &Config) -> Result<Arc<dyn TokenProvider>> {
    let sdk_config = config
        .aws_config()
        .ok_or_else(|| Error::config("aws config is required for AWS authentication"))?;

    // The token is scoped to the endpoint and user it will be presented to.
    let options = crate::connection::parse_connect_options(config.conn_string())?;
    Ok(Arc::new(AwsTokenProvider::new(
        sdk_config,
        options.get_host(),
        options.get_port(),
        options.get_username(),
    )?))
}

#[cfg(not(feature = "aws"))]
fn aws_provider(_config: &Config) -> Result<Arc<dyn TokenProvider>> {
    Err(Error::config("aws authentication requires the `aws` cargo feature"))
}

#[cfg(feature = "gcp")]
fn gcp_provider(config: &Config) -> Result<Arc<dyn TokenProvider>> {
    let token_provider = config
        .gcp_provider()
        .cloned()
        .ok_or_else(|| Error::config("gcp credentials are required for GCP authentication"))?;
    Ok(Arc::new(GcpTokenProvider::new(token_provider)))
}

#[cfg(not(feature = "gcp"))]
fn gcp_provider(_config: &Config) -> Result<Arc<dyn TokenProvider>> {
    Err(Error::config("gcp authentication requires the `gcp` cargo feature"))
}

#[cfg(feature = "azure")]
fn azure_provider(config: &Config) -> Result<Arc<dyn TokenProvider>> {
    Ok(Arc::new(AzureTokenProvider::new(
        config.azure_credentials().to_vec(),
    )?))
}

#[cfg(not(feature = "azure"))]
fn azure_provider(_config: &Config) -> Result<Arc<dyn TokenProvider>> {
    Err(Error::config("azure authentication requires the `azure` cargo feature"))
}
