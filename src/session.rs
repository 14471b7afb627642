use std::future::Future;

use crate::types::SessionTokens;

/// Boxed error returned by application-provided identity sessions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer-provided identity session for the signed-in principal.
///
/// The bridge calls this right before every exchange, so implementations
/// should return the provider's current (possibly rotated) token pair.
///
/// # Example
///
/// ```rust,ignore
/// impl IdentitySession for StackUser {
///     async fn session_tokens(&self) -> Result<SessionTokens, BoxError> {
///         let tokens = self.current_session().get_tokens().await?;
///         Ok(SessionTokens {
///             access_token: tokens.access_token,
///             refresh_token: tokens.refresh_token,
///         })
///     }
/// }
/// ```
pub trait IdentitySession: Send + Sync + 'static {
    /// Current `{access, refresh}` pair for this principal.
    fn session_tokens(&self) -> impl Future<Output = Result<SessionTokens, BoxError>> + Send;
}

/// Identity session holding a fixed token pair.
///
/// Useful for service accounts and for tests.
#[derive(Debug, Clone)]
pub struct StaticSession {
    tokens: SessionTokens,
}

impl StaticSession {
    #[must_use]
    pub fn new(tokens: SessionTokens) -> Self {
        Self { tokens }
    }
}

impl IdentitySession for StaticSession {
    async fn session_tokens(&self) -> Result<SessionTokens, BoxError> {
        Ok(self.tokens.clone())
    }
}
