#![doc = include_str!("../README.md")]

pub mod bridge;
pub mod config;
pub mod error;
pub mod exchange;
pub mod fetch;
pub mod jwt;
pub mod session;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-exports for convenient access
pub use bridge::{AuthBridge, EnsureOptions};
pub use config::{BridgeConfig, ExchangeTransport};
pub use error::Error;
pub use exchange::ExchangeClient;
pub use fetch::{AuthenticatedClient, apply_authorization_header};
pub use jwt::{is_expired, token_expiry_millis};
pub use session::{BoxError, IdentitySession, StaticSession};
pub use types::{AccessToken, AuthSnapshot, AuthStatus, SessionTokens};
