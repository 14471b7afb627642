use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Default exchange path on the backend, resolved against `BACKEND_BASE_URL`.
pub const DEFAULT_EXCHANGE_PATH: &str = "/api/auth/stack/exchange";

/// Default safety margin subtracted from a token's expiry.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(30);

/// How the identity session tokens are carried to the exchange endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExchangeTransport {
    /// JSON body `{"accessToken": .., "refreshToken": ..}`.
    #[default]
    JsonBody,
    /// `X-Stack-Access-Token` / `X-Stack-Refresh-Token` headers, no body.
    Headers,
}

impl std::str::FromStr for ExchangeTransport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "body" | "json" => Ok(Self::JsonBody),
            "headers" | "header" => Ok(Self::Headers),
            other => Err(Error::Config(format!(
                "STACK_EXCHANGE_TRANSPORT: unknown transport '{other}'"
            ))),
        }
    }
}

/// Authorization bridge configuration.
///
/// The exchange URL is a constructor parameter; everything else has a default.
///
/// ```rust,ignore
/// use microagents_auth::BridgeConfig;
///
/// let config = BridgeConfig::new("https://api.example.com/api/auth/stack/exchange".parse()?)
///     .with_expiry_buffer(std::time::Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BridgeConfig {
    pub(crate) exchange_url: Url,
    pub(crate) expiry_buffer: Duration,
    pub(crate) transport: ExchangeTransport,
}

impl BridgeConfig {
    #[must_use]
    pub fn new(exchange_url: Url) -> Self {
        Self {
            exchange_url,
            expiry_buffer: DEFAULT_EXPIRY_BUFFER,
            transport: ExchangeTransport::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Env vars
    /// - `STACK_JWT_EXCHANGE_URL`: absolute exchange URL, or a path resolved
    ///   against `BACKEND_BASE_URL` (default [`DEFAULT_EXCHANGE_PATH`])
    /// - `BACKEND_BASE_URL`: required when the exchange URL is relative
    /// - `AUTH_EXPIRY_BUFFER_SECS`: expiry safety margin in seconds (default 30)
    /// - `STACK_EXCHANGE_TRANSPORT`: `body` (default) or `headers`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is missing or cannot be parsed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let raw_url = lookup("STACK_JWT_EXCHANGE_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_EXCHANGE_PATH.to_string());

        let exchange_url = match Url::parse(&raw_url) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = lookup("BACKEND_BASE_URL").ok_or_else(|| {
                    Error::Config(format!(
                        "BACKEND_BASE_URL is required to resolve exchange path '{raw_url}'"
                    ))
                })?;
                let base: Url = base
                    .parse()
                    .map_err(|e| Error::Config(format!("BACKEND_BASE_URL: {e}")))?;
                base.join(&raw_url)
                    .map_err(|e| Error::Config(format!("STACK_JWT_EXCHANGE_URL: {e}")))?
            }
            Err(e) => return Err(Error::Config(format!("STACK_JWT_EXCHANGE_URL: {e}"))),
        };

        let mut config = Self::new(exchange_url);

        if let Some(secs) = lookup("AUTH_EXPIRY_BUFFER_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("AUTH_EXPIRY_BUFFER_SECS: {e}")))?;
            config = config.with_expiry_buffer(Duration::from_secs(secs));
        }
        if let Some(transport) = lookup("STACK_EXCHANGE_TRANSPORT") {
            config = config.with_transport(transport.parse()?);
        }

        Ok(config)
    }

    /// Override the exchange endpoint.
    #[must_use]
    pub fn with_exchange_url(mut self, url: Url) -> Self {
        self.exchange_url = url;
        self
    }

    /// Override the expiry safety margin (default 30 seconds).
    #[must_use]
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// Override how session tokens are sent (default JSON body).
    #[must_use]
    pub fn with_transport(mut self, transport: ExchangeTransport) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn exchange_url(&self) -> &Url {
        &self.exchange_url
    }

    #[must_use]
    pub fn expiry_buffer(&self) -> Duration {
        self.expiry_buffer
    }

    #[must_use]
    pub fn transport(&self) -> ExchangeTransport {
        self.transport
    }
}
