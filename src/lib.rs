//! # pg-iam-auth
//!
//! Short-lived IAM credential management for PostgreSQL connections.
//!
//! Cloud databases can be configured to accept an IAM access token in place of a
//! static password. Those tokens expire after minutes, so every new physical
//! connection needs a token that is still valid at the moment it is opened. This
//! crate owns that token, refreshes it before expiry, collapses concurrent refreshes
//! into a single fetch and retries transient failures of the token endpoint.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pg_iam_auth::{DefaultAuthOptions, default_config, new_pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pg_iam_auth::Error> {
//!     let options = DefaultAuthOptions::from_env()?;
//!     let config = default_config("postgres://app@db.internal:5432/app", options).await?;
//!
//!     let pool = new_pool(&config).await?;
//!     sqlx::query("SELECT 1").execute(&pool).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection surfaces
//!
//! All three share one [`TokenCoordinator`] per configuration:
//!
//! - [`BeforeConnect`] / [`AuthenticatedPool`]: pre-connect hook for pooled connections
//! - [`Connector`]: one physical connection per call
//! - [`authenticated_conn_string`]: the connection string with the token as password

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod auth;
pub mod config;
pub mod connection;
pub mod observability;
pub mod retry;

pub use auth::{AuthToken, StaticTokenProvider, TokenCoordinator, TokenProvider, Validity};
pub use config::{AuthMethod, Config, DefaultAuthOptions, VaultConfig, default_config};
pub use connection::{
    AuthenticatedPool, BeforeConnect, Connector, authenticated_conn_string, before_connect,
    connector, new_pool, new_pool_with, parse_connect_options, substitute_credentials,
    substitute_password,
};
pub use observability::{AuthMetrics, MetricsSummary, RetrySink, TracingSink};
pub use retry::{ExponentialBackoff, RetryConfig, RetryingFetcher};

#[cfg(feature = "aws")]
pub use auth::AwsTokenProvider;
#[cfg(feature = "azure")]
pub use auth::AzureTokenProvider;
#[cfg(feature = "gcp")]
pub use auth::GcpTokenProvider;
pub use auth::VaultTokenProvider;

use std::time::Duration;

/// Error type for pg-iam-auth operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing configuration for the selected identity source.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single token provider call failed.
    #[error("Token provider '{provider}' failed: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// Every attempt allowed by the retry policy failed.
    #[error("Fetching auth token failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Connection string could not be parsed or rewritten.
    #[error("Invalid connection string: {0}")]
    ConnectionString(String),

    /// A provider call exceeded the per-attempt timeout.
    #[error("Token fetch timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Database driver failed to connect.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration or connection string problems; never retried.
    Configuration,
    /// Provider or timeout failures that may succeed on retry.
    Transient,
    /// Retry budget spent.
    Exhausted,
    /// Driver-level connection failures.
    Database,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Error::Provider {
            provider,
            message: message.into(),
        }
    }

    pub fn connection_string(message: impl Into<String>) -> Self {
        Error::ConnectionString(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::ConnectionString(_) => ErrorCategory::Configuration,
            Error::Provider { .. } | Error::Timeout(_) => ErrorCategory::Transient,
            Error::Fetch { .. } => ErrorCategory::Exhausted,
            Error::Database(_) => ErrorCategory::Database,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Number of attempts made before a fetch gave up.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::Fetch { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Result type alias using the crate's Error.
pub type Result<T> = std::result::Result<T, Error>;
