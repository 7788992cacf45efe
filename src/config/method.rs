use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Identity source used to authenticate database connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthMethod {
    /// Password (if any) comes from the connection string itself.
    #[default]
    Standard,
    Aws,
    Gcp,
    Azure,
    Vault,
    /// Caller-supplied [`TokenProvider`](crate::TokenProvider).
    Custom,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Standard => "standard",
            AuthMethod::Aws => "aws",
            AuthMethod::Gcp => "gcp",
            AuthMethod::Azure => "azure",
            AuthMethod::Vault => "vault",
            AuthMethod::Custom => "custom",
        }
    }

    /// Whether connections need a token from a provider.
    pub fn uses_token(&self) -> bool {
        !matches!(self, AuthMethod::Standard)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the numeric codes `0`-`4` as well as names, case-insensitively.
impl FromStr for AuthMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "standard" | "none" => Ok(AuthMethod::Standard),
            "1" | "aws" => Ok(AuthMethod::Aws),
            "2" | "gcp" => Ok(AuthMethod::Gcp),
            "3" | "azure" => Ok(AuthMethod::Azure),
            "4" | "vault" => Ok(AuthMethod::Vault),
            "custom" => Ok(AuthMethod::Custom),
            _ => Err(Error::config(format!(
                "unsupported authentication method: {}",
                s.trim()
            ))),
        }
    }
}

impl TryFrom<i64> for AuthMethod {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(AuthMethod::Standard),
            1 => Ok(AuthMethod::Aws),
            2 => Ok(AuthMethod::Gcp),
            3 => Ok(AuthMethod::Azure),
            4 => Ok(AuthMethod::Vault),
            other => Err(Error::config(format!(
                "unsupported authentication method: {}",
                other
            ))),
        }
    }
}
