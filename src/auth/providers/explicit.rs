//! Static token provider.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::Result;
use crate::auth::{AuthToken, TokenProvider};

/// Provider that always returns the same password.
pub struct StaticTokenProvider {
    password: SecretString,
    username: Option<String>,
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("password.len()", &self.password.expose_secret().len())
            .field("username", &self.username)
            .finish()
    }
}

impl StaticTokenProvider {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: SecretString::from(password.into()),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn generate_token(&self) -> Result<AuthToken> {
        let token = AuthToken::non_expiring(self.password.expose_secret());
        Ok(match self.username {
            Some(ref username) => token.with_username(username.clone()),
            None => token,
        })
    }
}
