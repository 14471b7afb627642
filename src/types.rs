use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Backend-issued access token (signed JWT).
///
/// Opaque to the bridge apart from its `exp` claim. `Debug` is redacted so
/// the token never ends up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque token pair handed out by the identity provider for the signed-in principal.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
        }
    }

    /// Borrow both tokens, rejecting absent or empty ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingSessionToken`] naming the first missing token.
    pub fn require(&self) -> Result<(&str, &str), Error> {
        let access = self
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingSessionToken("access token"))?;
        let refresh = self
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::MissingSessionToken("refresh token"))?;
        Ok((access, refresh))
    }
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Lifecycle phase of the bridge's authorization state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    #[default]
    #[display("idle")]
    Idle,
    #[display("loading")]
    Loading,
    #[display("ready")]
    Ready,
    #[display("error")]
    Error,
}

/// Read-only view of the authorization state.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct AuthSnapshot {
    pub status: AuthStatus,
    pub token: Option<AccessToken>,
    /// Epoch milliseconds from the token's `exp` claim.
    pub expires_at: Option<i64>,
    pub error: Option<Error>,
}
