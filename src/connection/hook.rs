use std::sync::Arc;

use sqlx::postgres::PgConnectOptions;

use crate::Result;
use crate::auth::{AuthToken, TokenCoordinator};

/// Writes the current token into connect options right before a connection opens.
///
/// Without a coordinator (standard auth) the options pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct BeforeConnect {
    coordinator: Option<Arc<TokenCoordinator>>,
}

impl BeforeConnect {
    pub fn new(coordinator: Arc<TokenCoordinator>) -> Self {
        Self {
            coordinator: Some(coordinator),
        }
    }

    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.coordinator.is_none()
    }

    pub fn coordinator(&self) -> Option<&Arc<TokenCoordinator>> {
        self.coordinator.as_ref()
    }

    /// Set the password, and the user when the token carries one.
    pub async fn apply(&self, options: PgConnectOptions) -> Result<PgConnectOptions> {
        let Some(ref coordinator) = self.coordinator else {
            return Ok(options);
        };

        let token = coordinator.current_token().await?;
        Ok(with_token(options, &token))
    }
}

pub(crate) fn with_token(options: PgConnectOptions, token: &AuthToken) -> PgConnectOptions {
    let options = options.password(token.expose());
    match token.username() {
        Some(username) => options.username(username),
        None => options,
    }
}
