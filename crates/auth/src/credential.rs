use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bearer credential for an authenticated session (transport-agnostic).
///
/// The token is opaque to the client. `expires_at` is only a hint from the
/// backend; the server's answer always wins.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    token: String,

    /// When this client obtained the token.
    pub issued_at: DateTime<Utc>,

    /// How the token was obtained ("login", "refresh", "password-change").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Optional expiry hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential token is empty")]
    EmptyToken,

    #[error("credential has expired")]
    Expired,

    #[error("invalid credential time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

impl Credential {
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            issued_at,
            context: None,
            expires_at: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Whether the expiry hint says the token is stale at `now`.
    ///
    /// A credential without a hint is never considered expired locally.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }

    /// Deterministically check the credential's shape and expiry hint.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), CredentialError> {
        if self.token.trim().is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        if let Some(exp) = self.expires_at {
            if exp <= self.issued_at {
                return Err(CredentialError::InvalidTimeWindow);
            }
        }
        if self.is_expired_at(now) {
            return Err(CredentialError::Expired);
        }
        Ok(())
    }
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("context", &self.context)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
