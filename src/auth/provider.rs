//! Token provider trait.

use async_trait::async_trait;

use super::AuthToken;
use crate::Result;

/// Produces fresh tokens from one identity source.
///
/// Implementations perform a single remote call chain and do not retry;
/// retries belong to [`RetryingFetcher`](crate::RetryingFetcher).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Provider name for logging and error context.
    fn name(&self) -> &'static str;

    /// Fetch a new token.
    async fn generate_token(&self) -> Result<AuthToken>;
}
