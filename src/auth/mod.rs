//! Token model, providers and the refresh coordinator.
//!
//! Identity sources:
//! - **AWS**: RDS IAM auth tokens (SigV4 presigned, 15 minute lifetime)
//! - **GCP**: OAuth access tokens for Cloud SQL IAM users
//! - **Azure**: Microsoft Entra ID tokens for Azure Database for PostgreSQL
//! - **Vault**: dynamic username/password pairs from the database secrets engine
//! - **Static**: a fixed password, mostly for tests and local development

mod coordinator;
mod provider;
pub(crate) mod providers;
mod token;

pub use coordinator::TokenCoordinator;
pub use provider::TokenProvider;
#[cfg(feature = "aws")]
pub use providers::AwsTokenProvider;
#[cfg(feature = "azure")]
pub use providers::{AzureTokenProvider, OSSRDBMS_SCOPE};
#[cfg(feature = "gcp")]
pub use providers::{CLOUD_PLATFORM_SCOPE, GcpTokenProvider};
pub use providers::{StaticTokenProvider, VaultConfig, VaultTokenProvider, build_provider};
pub use token::{AuthToken, Validity};
