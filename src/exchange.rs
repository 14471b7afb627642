use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::config::{BridgeConfig, ExchangeTransport};
use crate::error::Error;
use crate::types::{AccessToken, SessionTokens};

/// Header carrying the identity access token in [`ExchangeTransport::Headers`] mode.
pub const ACCESS_TOKEN_HEADER: &str = "X-Stack-Access-Token";
/// Header carrying the identity refresh token in [`ExchangeTransport::Headers`] mode.
pub const REFRESH_TOKEN_HEADER: &str = "X-Stack-Refresh-Token";

/// Body posted to the exchange endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    access_token: &'a str,
    refresh_token: &'a str,
}

/// Client for the backend token exchange endpoint.
///
/// Trades an identity session's token pair for a backend-issued JWT.
pub struct ExchangeClient {
    config: BridgeConfig,
    http: reqwest::Client,
}

impl ExchangeClient {
    /// Create a client with a cookie-keeping HTTP client, so backend session
    /// cookies travel with every exchange.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: BridgeConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse, timeouts, or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Exchange the session's token pair for a backend access token.
    ///
    /// Makes exactly one request and never retries.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingSessionToken`] before any I/O if either token is absent or empty
    /// - [`Error::ExchangeStatus`] for a non-2xx answer
    /// - [`Error::MissingAccessToken`] for a 2xx answer without a usable `access_token`
    /// - [`Error::Http`] on network failure
    pub async fn request_token(&self, tokens: &SessionTokens) -> Result<AccessToken, Error> {
        let (access_token, refresh_token) = tokens.require()?;

        let request = self.http.post(self.config.exchange_url.clone());
        let request = match self.config.transport {
            ExchangeTransport::JsonBody => request.json(&ExchangeRequest {
                access_token,
                refresh_token,
            }),
            ExchangeTransport::Headers => request
                .header(ACCESS_TOKEN_HEADER, access_token)
                .header(REFRESH_TOKEN_HEADER, refresh_token),
        };

        tracing::debug!(url = %self.config.exchange_url, "Requesting backend token exchange");
        let response = request.send().await?;
        let response = Self::ensure_success(response).await?;
        let body = response.bytes().await?;

        Self::parse_access_token(&body)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(Error::ExchangeStatus { status, detail })
    }

    fn parse_access_token(body: &[u8]) -> Result<AccessToken, Error> {
        let value: JsonValue = serde_json::from_slice(body).map_err(|e| {
            tracing::debug!(error = %e, "Exchange response is not JSON");
            Error::MissingAccessToken
        })?;

        value
            .get("access_token")
            .and_then(JsonValue::as_str)
            .filter(|t| !t.is_empty())
            .map(AccessToken::from)
            .ok_or(Error::MissingAccessToken)
    }
}
