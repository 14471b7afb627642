//! Authorization state machine.
//!
//! [`AuthBridge`] owns the backend token for one principal slot. It hands out
//! cached tokens while they are fresh, runs at most one exchange at a time,
//! and lets concurrent callers join the exchange already running.

use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::BridgeConfig;
use crate::error::Error;
use crate::exchange::ExchangeClient;
use crate::jwt;
use crate::session::IdentitySession;
use crate::types::{AccessToken, AuthSnapshot, AuthStatus};

type SharedExchange = Shared<BoxFuture<'static, Result<AccessToken, Error>>>;

/// Options for [`AuthBridge::ensure_authorization_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsureOptions {
    /// Skip the cache and exchange again.
    pub force: bool,
}

struct Inflight {
    id: u64,
    future: SharedExchange,
}

struct AuthState<S> {
    principal: Option<Arc<S>>,
    status: AuthStatus,
    token: Option<AccessToken>,
    expires_at: Option<i64>,
    error: Option<Error>,
    inflight: Option<Inflight>,
    /// Bumped by every reset; exchanges only commit under the generation they started in.
    generation: u64,
    next_operation: u64,
}

impl<S> AuthState<S> {
    fn new() -> Self {
        Self {
            principal: None,
            status: AuthStatus::Idle,
            token: None,
            expires_at: None,
            error: None,
            inflight: None,
            generation: 0,
            next_operation: 0,
        }
    }

    fn reset(&mut self) {
        self.status = AuthStatus::Idle;
        self.token = None;
        self.expires_at = None;
        self.error = None;
        self.inflight = None;
        self.generation += 1;
    }

    fn usable_token(&self, now: i64, buffer: std::time::Duration) -> Option<AccessToken> {
        let token = self.token.as_ref()?;
        (!jwt::is_expired(self.expires_at, now, buffer)).then(|| token.clone())
    }

    fn snapshot(&self) -> AuthSnapshot {
        AuthSnapshot {
            status: self.status,
            token: self.token.clone(),
            expires_at: self.expires_at,
            error: self.error.clone(),
        }
    }
}

struct Inner<S> {
    client: ExchangeClient,
    state: Mutex<AuthState<S>>,
    snapshots: watch::Sender<AuthSnapshot>,
}

impl<S: IdentitySession> Inner<S> {
    fn publish(&self, state: &AuthState<S>) {
        self.snapshots.send_replace(state.snapshot());
    }

    async fn run_exchange(
        self: Arc<Self>,
        principal: Arc<S>,
        generation: u64,
        id: u64,
    ) -> Result<AccessToken, Error> {
        let result = self.exchange(principal.as_ref()).await;
        self.commit(generation, id, result)
    }

    /// Store an exchange outcome unless a reset happened since it started.
    fn commit(
        &self,
        generation: u64,
        id: u64,
        result: Result<(AccessToken, Option<i64>), Error>,
    ) -> Result<AccessToken, Error> {
        let mut state = self.state.lock();
        if state.inflight.as_ref().is_some_and(|f| f.id == id) {
            state.inflight = None;
        }
        if state.generation != generation {
            tracing::debug!(
                generation,
                current = state.generation,
                "Discarding exchange result from before reset"
            );
            return result.map(|(token, _)| token);
        }

        match result {
            Ok((token, expires_at)) => {
                state.token = Some(token.clone());
                state.expires_at = expires_at;
                state.status = AuthStatus::Ready;
                state.error = None;
                self.publish(&state);
                tracing::info!(expires_at = ?expires_at, "Backend token stored");
                Ok(token)
            }
            Err(e) => {
                state.token = None;
                state.expires_at = None;
                state.status = AuthStatus::Error;
                state.error = Some(e.clone());
                self.publish(&state);
                tracing::warn!(error = %e, "Backend token exchange failed");
                Err(e)
            }
        }
    }

    async fn exchange(&self, principal: &S) -> Result<(AccessToken, Option<i64>), Error> {
        let tokens = principal
            .session_tokens()
            .await
            .map_err(|e| Error::Session(e.to_string()))?;
        let token = self.client.request_token(&tokens).await?;
        let expires_at = jwt::token_expiry_millis(token.as_str());
        if expires_at.is_some_and(|exp| exp <= jwt::now_millis()) {
            return Err(Error::ExpiredToken);
        }
        Ok((token, expires_at))
    }
}

/// Backend authorization bridge.
///
/// Cheap to clone; clones share the same state. Attach the signed-in
/// principal with [`attach_session`](Self::attach_session) and detach it on
/// sign-out.
///
/// ```rust,ignore
/// let bridge = AuthBridge::from_config(BridgeConfig::from_env()?)?;
/// bridge.attach_session(stack_user);
/// bridge.spawn_prime();
///
/// let client = bridge.authenticated_client();
/// let response = client.send(client.get("https://api.example.com/chatkit/session")).await?;
/// ```
pub struct AuthBridge<S> {
    inner: Arc<Inner<S>>,
}

// Clones share state; `S` itself need not be `Clone`.
impl<S> Clone for AuthBridge<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: IdentitySession> AuthBridge<S> {
    #[must_use]
    pub fn new(client: ExchangeClient) -> Self {
        let (snapshots, _) = watch::channel(AuthSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                client,
                state: Mutex::new(AuthState::new()),
                snapshots,
            }),
        }
    }

    /// Build a bridge with the default exchange client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: BridgeConfig) -> Result<Self, Error> {
        Ok(Self::new(ExchangeClient::new(config)?))
    }

    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        self.inner.client.config()
    }

    /// Install the signed-in principal, discarding any previous authorization.
    pub fn attach_session(&self, session: S) {
        let mut state = self.inner.state.lock();
        state.reset();
        state.principal = Some(Arc::new(session));
        self.inner.publish(&state);
    }

    /// Remove the principal (sign-out) and reset to idle.
    pub fn detach_session(&self) {
        let mut state = self.inner.state.lock();
        state.reset();
        state.principal = None;
        self.inner.publish(&state);
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.lock().principal.is_some()
    }

    /// Reset to idle and forget the in-flight exchange.
    ///
    /// A running exchange is not cancelled, but its result is not stored.
    /// Exchanges run on the tokio runtime and settle even when every caller
    /// has gone away.
    pub fn clear_authorization(&self) {
        let mut state = self.inner.state.lock();
        state.reset();
        self.inner.publish(&state);
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Receiver updated on every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Return a valid backend token, exchanging one if needed.
    ///
    /// # Errors
    ///
    /// [`Error::NoAuthenticatedUser`] without a principal, otherwise any
    /// exchange error. Callers joined on the same exchange get the same error.
    pub async fn ensure_authorization(&self) -> Result<AccessToken, Error> {
        self.ensure_authorization_with(EnsureOptions::default())
            .await
    }

    /// Exchange again even if the cached token is still fresh.
    ///
    /// Joins an exchange that is already running instead of starting another.
    ///
    /// # Errors
    ///
    /// Same as [`ensure_authorization`](Self::ensure_authorization).
    pub async fn refresh_authorization(&self) -> Result<AccessToken, Error> {
        self.ensure_authorization_with(EnsureOptions { force: true })
            .await
    }

    /// # Errors
    ///
    /// Same as [`ensure_authorization`](Self::ensure_authorization).
    pub async fn ensure_authorization_with(
        &self,
        options: EnsureOptions,
    ) -> Result<AccessToken, Error> {
        let exchange = {
            let mut state = self.inner.state.lock();
            let principal = state
                .principal
                .clone()
                .ok_or(Error::NoAuthenticatedUser)?;

            if !options.force {
                let buffer = self.config().expiry_buffer();
                if let Some(token) = state.usable_token(jwt::now_millis(), buffer) {
                    if state.status != AuthStatus::Ready {
                        state.status = AuthStatus::Ready;
                        self.inner.publish(&state);
                    }
                    return Ok(token);
                }
            }

            match &state.inflight {
                Some(inflight) => inflight.future.clone(),
                None => self.start_exchange(&mut state, principal),
            }
        };

        exchange.await
    }

    fn start_exchange(&self, state: &mut AuthState<S>, principal: Arc<S>) -> SharedExchange {
        state.next_operation += 1;
        let id = state.next_operation;
        let generation = state.generation;

        state.status = AuthStatus::Loading;
        state.error = None;

        // Runs to completion even if every caller is dropped.
        let exchange = Arc::clone(&self.inner).run_exchange(principal, generation, id);
        let task = tokio::spawn(exchange);
        let inner = Arc::clone(&self.inner);
        let future = task
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Backend token exchange task failed");
                    inner.commit(generation, id, Err(Error::ExchangeAborted(e.to_string())))
                })
            })
            .boxed()
            .shared();
        state.inflight = Some(Inflight {
            id,
            future: future.clone(),
        });
        self.inner.publish(state);

        future
    }

    /// Ensure a token once, logging instead of returning a failure.
    ///
    /// Meant to run right after sign-in so the first request finds a token.
    pub async fn prime(&self) {
        if let Err(e) = self.ensure_authorization().await {
            tracing::warn!(error = %e, "Failed to prime backend token");
        }
    }

    /// Run [`prime`](Self::prime) on the tokio runtime.
    pub fn spawn_prime(&self) -> tokio::task::JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move { bridge.prime().await })
    }
}
