//! Ambient-credential configuration for code running inside a cloud environment.

use super::env::{env_opt, first_of};
use super::{AuthMethod, Config, VaultConfig};
use crate::{Error, Result};

/// Inputs for [`default_config`].
#[derive(Debug, Clone, Default)]
pub struct DefaultAuthOptions {
    pub auth_method: AuthMethod,
    /// Region of the RDS instance; required for AWS.
    pub aws_region: Option<String>,
    /// Client id of a user-assigned managed identity.
    pub azure_client_id: Option<String>,
    pub vault: Option<VaultConfig>,
}

impl DefaultAuthOptions {
    pub fn new(auth_method: AuthMethod) -> Self {
        Self {
            auth_method,
            ..Default::default()
        }
    }

    /// Read options from the process environment.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `AUTH_METHOD` | `0`-`4` or a method name; unset means standard |
    /// | `AWS_REGION`, `AWS_DEFAULT_REGION` | RDS region |
    /// | `AZURE_CLIENT_ID` | user-assigned managed identity |
    /// | `VAULT_ADDR`, `VAULT_TOKEN`, `VAULT_DB_SECRET_PATH` | Vault secret location |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_opt)
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let auth_method = match first_of(&lookup, &["AUTH_METHOD"]) {
            Some(value) => value.parse()?,
            None => AuthMethod::Standard,
        };

        let vault = match (
            first_of(&lookup, &["VAULT_ADDR"]),
            first_of(&lookup, &["VAULT_TOKEN"]),
            first_of(&lookup, &["VAULT_DB_SECRET_PATH"]),
        ) {
            (Some(address), Some(token), Some(path)) => {
                Some(VaultConfig::new(address, token, path))
            }
            _ => None,
        };

        Ok(Self {
            auth_method,
            aws_region: first_of(&lookup, &["AWS_REGION", "AWS_DEFAULT_REGION"]),
            azure_client_id: first_of(&lookup, &["AZURE_CLIENT_ID"]),
            vault,
        })
    }

    pub fn with_aws_region(mut self, region: impl Into<String>) -> Self {
        self.aws_region = Some(region.into());
        self
    }

    pub fn with_azure_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.azure_client_id = Some(client_id.into());
        self
    }

    pub fn with_vault(mut self, vault: VaultConfig) -> Self {
        self.vault = Some(vault);
        self
    }
}

/// Build a [`Config`] that authenticates with the ambient identity of the host.
///
/// - AWS: SDK default credential chain for `aws_region` (the region is required).
/// - GCP: application default credentials.
/// - Azure: workload identity, then managed identity.
/// - Vault: the address, token and path from `options`.
pub async fn default_config(
    conn_string: impl Into<String>,
    options: DefaultAuthOptions,
) -> Result<Config> {
    let config = Config::new(conn_string);

    let config = match options.auth_method {
        AuthMethod::Standard => config,
        AuthMethod::Aws => with_ambient_aws(config, options.aws_region.as_deref()).await?,
        AuthMethod::Gcp => with_ambient_gcp(config).await?,
        AuthMethod::Azure => with_ambient_azure(config, options.azure_client_id.as_deref())?,
        AuthMethod::Vault => match options.vault {
            Some(vault) => config.with_vault(vault),
            None => config.with_auth_method(AuthMethod::Vault),
        },
        AuthMethod::Custom => config.with_auth_method(AuthMethod::Custom),
    };

    config.validate()?;
    Ok(config)
}

#[cfg(feature = "aws")]
async fn with_ambient_aws(config: Config, region: Option<&str>) -> Result<Config> {
    let region = region
        .ok_or_else(|| Error::config("aws region is required for AWS IAM authentication"))?;

    let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()))
        .load()
        .await;

    Ok(config.with_aws_config(loaded_aws_config(sdk_config, region)?))
}

/// Reject an SDK config whose default chain resolved no credentials provider.
#[cfg(feature = "aws")]
fn loaded_aws_config(
    sdk_config: aws_config::SdkConfig,
    region: &str,
) -> Result<aws_config::SdkConfig> {
    if sdk_config.credentials_provider().is_none() {
        return Err(Error::config(format!(
            "failed to load AWS config: no credentials provider resolved for region {}",
            region
        )));
    }
    Ok(sdk_config)
}

#[cfg(not(feature = "aws"))]
async fn with_ambient_aws(config: Config, region: Option<&str>) -> Result<Config> {
    if region.is_none() {
        return Err(Error::config(
            "aws region is required for AWS IAM authentication",
        ));
    }
    Ok(config.with_auth_method(AuthMethod::Aws))
}

#[cfg(feature = "gcp")]
async fn with_ambient_gcp(config: Config) -> Result<Config> {
    let provider = gcp_auth::provider()
        .await
        .map_err(|e| Error::config(format!("failed to get GCP credentials: {}", e)))?;
    Ok(config.with_gcp_provider(provider))
}

#[cfg(not(feature = "gcp"))]
async fn with_ambient_gcp(config: Config) -> Result<Config> {
    Ok(config.with_auth_method(AuthMethod::Gcp))
}

#[cfg(feature = "azure")]
fn with_ambient_azure(config: Config, client_id: Option<&str>) -> Result<Config> {
    let credentials = crate::auth::providers::azure::default_credentials(client_id)?;
    Ok(credentials
        .into_iter()
        .fold(config, |config, credential| config.with_azure_credential(credential)))
}

#[cfg(not(feature = "azure"))]
fn with_ambient_azure(config: Config, _client_id: Option<&str>) -> Result<Config> {
    Ok(config.with_auth_method(AuthMethod::Azure))
}
