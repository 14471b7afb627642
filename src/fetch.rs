use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{IntoUrl, Method, Request, RequestBuilder, Response, StatusCode};

use crate::bridge::AuthBridge;
use crate::error::Error;
use crate::session::IdentitySession;
use crate::types::AccessToken;

/// Sets `Authorization: Bearer <token>`, replacing any existing value.
///
/// # Errors
///
/// Returns [`Error::InvalidHeader`] if the token contains bytes not allowed in a header.
pub fn apply_authorization_header(token: &AccessToken, headers: &mut HeaderMap) -> Result<(), Error> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
        .map_err(|_| Error::InvalidHeader)?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

/// HTTP client that authorizes every request with the bridge's backend token.
///
/// A `401` answer triggers one forced refresh and one replay of the request.
/// Any caller-supplied `Authorization` header is overwritten.
pub struct AuthenticatedClient<S> {
    bridge: AuthBridge<S>,
    http: reqwest::Client,
}

impl<S> Clone for AuthenticatedClient<S> {
    fn clone(&self) -> Self {
        Self {
            bridge: self.bridge.clone(),
            http: self.http.clone(),
        }
    }
}

impl<S: IdentitySession> AuthenticatedClient<S> {
    #[must_use]
    pub fn new(bridge: AuthBridge<S>) -> Self {
        Self {
            bridge,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse, timeouts, or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn bridge(&self) -> &AuthBridge<S> {
        &self.bridge
    }

    /// Start building a request; send it with [`send`](Self::send).
    pub fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        self.http.request(method, url)
    }

    pub fn get(&self, url: impl IntoUrl) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: impl IntoUrl) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Build and [`execute`](Self::execute) a request.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute), plus [`Error::Http`] if the builder is invalid.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, Error> {
        self.execute(builder.build()?).await
    }

    /// Dispatch `request` with a bearer token, retrying once after a `401`.
    ///
    /// Any response, including a 401 that survived the retry, is returned as-is.
    /// A failed refresh, or a refreshed token that is not a valid header value,
    /// is logged and the original 401 is returned.
    ///
    /// # Errors
    ///
    /// Returns the bridge error if no token can be obtained for the first
    /// attempt, or [`Error::Http`] on network failure.
    pub async fn execute(&self, mut request: Request) -> Result<Response, Error> {
        let token = self.bridge.ensure_authorization().await?;
        let replay = request.try_clone();

        apply_authorization_header(&token, request.headers_mut())?;
        let first = self.http.execute(request).await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        let Some(mut replay) = replay else {
            tracing::warn!(url = %first.url(), "Request body cannot be replayed after 401");
            return Ok(first);
        };

        let refreshed = match self.bridge.refresh_authorization().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh backend token after 401");
                return Ok(first);
            }
        };

        if let Err(e) = apply_authorization_header(&refreshed, replay.headers_mut()) {
            tracing::warn!(error = %e, "Refreshed backend token cannot be sent after 401");
            return Ok(first);
        }
        Ok(self.http.execute(replay).await?)
    }
}

impl<S: IdentitySession> AuthBridge<S> {
    /// Authenticated client sharing this bridge's state.
    #[must_use]
    pub fn authenticated_client(&self) -> AuthenticatedClient<S> {
        AuthenticatedClient::new(self.clone())
    }
}
