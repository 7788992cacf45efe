//! Immutable auth token with a wall-clock validity predicate.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use secrecy::{ExposeSecret, SecretString};

/// How a token decides whether it may still be used for a new connection.
#[derive(Clone)]
pub enum Validity {
    /// Never expires (static passwords).
    Always,
    /// Usable strictly before the given instant.
    Until(SystemTime),
    /// Delegates to the issuing SDK's own expiry check.
    Predicate(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl Validity {
    /// Valid until `expires_at - margin`.
    pub fn with_margin(expires_at: SystemTime, margin: Duration) -> Self {
        let deadline = expires_at.checked_sub(margin).unwrap_or(SystemTime::UNIX_EPOCH);
        Validity::Until(deadline)
    }

    /// Valid for `lifetime - margin` from now.
    pub fn for_lifetime(lifetime: Duration, margin: Duration) -> Self {
        Self::with_margin(SystemTime::now() + lifetime, margin)
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Validity::Always => true,
            Validity::Until(deadline) => SystemTime::now() < *deadline,
            Validity::Predicate(check) => check(),
        }
    }
}

impl fmt::Debug for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Always => f.write_str("Always"),
            Validity::Until(deadline) => f.debug_tuple("Until").field(deadline).finish(),
            Validity::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Credential handed to the database as a password.
///
/// Tokens never change after construction; a refresh builds a new one.
#[derive(Clone)]
pub struct AuthToken {
    credential: SecretString,
    username: Option<String>,
    validity: Validity,
}

impl AuthToken {
    pub fn new(credential: impl Into<String>, validity: Validity) -> Self {
        Self {
            credential: SecretString::from(credential.into()),
            username: None,
            validity,
        }
    }

    /// Token that never expires.
    pub fn non_expiring(credential: impl Into<String>) -> Self {
        Self::new(credential, Validity::Always)
    }

    /// Attach the database user issued alongside the credential.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Evaluated against the current time on every call.
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    pub fn credential(&self) -> &SecretString {
        &self.credential
    }

    pub fn expose(&self) -> &str {
        self.credential.expose_secret()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn validity(&self) -> &Validity {
        &self.validity
    }

    /// Deadline after which the token is no longer handed out, if known.
    pub fn expires_at(&self) -> Option<SystemTime> {
        match self.validity {
            Validity::Until(deadline) => Some(deadline),
            _ => None,
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("credential", &"[redacted]")
            .field("username", &self.username)
            .field("validity", &self.validity)
            .finish()
    }
}
