use std::sync::Arc;

/// Errors produced by the authorization bridge.
///
/// `Clone` so that every caller joined on a single in-flight exchange
/// receives the same failure.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No identity session is attached to the bridge.
    #[error("No authenticated user available for backend authorization")]
    NoAuthenticatedUser,

    /// The identity session is missing one of its tokens.
    #[error("Identity session is missing {0}")]
    MissingSessionToken(&'static str),

    /// The exchange endpoint answered with a non-2xx status.
    #[error("JWT exchange failed with status {status}")]
    ExchangeStatus { status: u16, detail: String },

    /// The exchange endpoint answered 2xx without a usable `access_token`.
    #[error("JWT exchange response did not include an access token")]
    MissingAccessToken,

    /// The exchange endpoint issued a token whose `exp` already passed.
    #[error("JWT exchange returned an already expired token")]
    ExpiredToken,

    /// The identity provider failed to hand out session tokens.
    #[error("Identity session error: {0}")]
    Session(String),

    /// The token cannot be carried in an `Authorization` header.
    #[error("Access token is not a valid header value")]
    InvalidHeader,

    #[error("HTTP error: {0}")]
    Http(#[source] Arc<reqwest::Error>),

    /// The background exchange task panicked or was cancelled.
    #[error("JWT exchange task aborted: {0}")]
    ExchangeAborted(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(Arc::new(e))
    }
}

impl Error {
    /// HTTP status reported by the exchange endpoint, if this is a status failure.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ExchangeStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
