//! In-process mock backend for tests: an exchange endpoint and a protected resource.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, post};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};
use url::Url;

use crate::config::{BridgeConfig, DEFAULT_EXCHANGE_PATH};
use crate::exchange::ExchangeClient;
use crate::session::StaticSession;
use crate::types::SessionTokens;

/// What the exchange endpoint answers.
#[derive(Debug, Clone)]
pub(crate) enum ExchangeReply {
    /// Issue a fresh JWT expiring `ttl_secs` from now.
    Issue { ttl_secs: i64 },
    /// Issue a token without a decodable expiry.
    Opaque,
    Status(u16),
    Json(JsonValue),
}

/// What the protected resource answers.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ResourceReply {
    /// 401 for the first `n` calls, 200 afterwards.
    RejectFirst(usize),
    AlwaysUnauthorized,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedExchange {
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

struct MockState {
    exchange_reply: Mutex<ExchangeReply>,
    exchange_delay: Mutex<Duration>,
    exchange_calls: AtomicUsize,
    exchanges: Mutex<Vec<RecordedExchange>>,
    issued: Mutex<Vec<String>>,
    resource_reply: Mutex<ResourceReply>,
    resource_calls: AtomicUsize,
    resource_requests: Mutex<Vec<HeaderMap>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            exchange_reply: Mutex::new(ExchangeReply::Issue { ttl_secs: 3600 }),
            exchange_delay: Mutex::new(Duration::ZERO),
            exchange_calls: AtomicUsize::new(0),
            exchanges: Mutex::new(Vec::new()),
            issued: Mutex::new(Vec::new()),
            resource_reply: Mutex::new(ResourceReply::RejectFirst(0)),
            resource_calls: AtomicUsize::new(0),
            resource_requests: Mutex::new(Vec::new()),
        }
    }
}

pub(crate) struct MockBackend {
    base: Url,
    state: Arc<MockState>,
}

impl MockBackend {
    pub(crate) async fn spawn() -> Self {
        init_tracing();

        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route(DEFAULT_EXCHANGE_PATH, post(exchange))
            .route("/resource", any(resource))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend");
        });

        Self {
            base: format!("http://{addr}").parse().expect("valid mock URL"),
            state,
        }
    }

    pub(crate) fn exchange_url(&self) -> Url {
        self.base.join(DEFAULT_EXCHANGE_PATH).expect("valid exchange URL")
    }

    pub(crate) fn resource_url(&self) -> Url {
        self.base.join("/resource").expect("valid resource URL")
    }

    pub(crate) fn config(&self) -> BridgeConfig {
        BridgeConfig::new(self.exchange_url())
    }

    pub(crate) fn client(&self) -> ExchangeClient {
        ExchangeClient::new(self.config()).expect("exchange client")
    }

    pub(crate) fn set_exchange_reply(&self, reply: ExchangeReply) {
        *self.state.exchange_reply.lock() = reply;
    }

    pub(crate) fn set_exchange_delay(&self, delay: Duration) {
        *self.state.exchange_delay.lock() = delay;
    }

    pub(crate) fn set_resource_reply(&self, reply: ResourceReply) {
        *self.state.resource_reply.lock() = reply;
    }

    pub(crate) fn exchange_calls(&self) -> usize {
        self.state.exchange_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn exchanges(&self) -> Vec<RecordedExchange> {
        self.state.exchanges.lock().clone()
    }

    pub(crate) fn issued(&self) -> Vec<String> {
        self.state.issued.lock().clone()
    }

    pub(crate) fn resource_calls(&self) -> usize {
        self.state.resource_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn resource_requests(&self) -> Vec<HeaderMap> {
        self.state.resource_requests.lock().clone()
    }

    /// `Authorization` header values seen by the resource, in order.
    pub(crate) fn resource_authorizations(&self) -> Vec<Option<String>> {
        self.resource_requests()
            .iter()
            .map(|h| {
                h.get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }
}

pub(crate) fn session() -> StaticSession {
    StaticSession::new(SessionTokens::new("stack-access", "stack-refresh"))
}

/// Unsigned JWT carrying `claims`.
pub(crate) fn make_jwt(claims: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.mock-signature")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn exchange(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> Response {
    let n = state.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
    state.exchanges.lock().push(RecordedExchange { headers, body });

    let delay = *state.exchange_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let reply = state.exchange_reply.lock().clone();
    match reply {
        ExchangeReply::Issue { ttl_secs } => {
            let now = time::OffsetDateTime::now_utc().unix_timestamp();
            let token = make_jwt(&json!({ "sub": "user-1", "jti": n, "exp": now + ttl_secs }));
            state.issued.lock().push(token.clone());
            axum::Json(json!({
                "access_token": token,
                "token_type": "bearer",
                "expires_in": ttl_secs,
            }))
            .into_response()
        }
        ExchangeReply::Opaque => {
            let token = format!("opaque-{n}");
            state.issued.lock().push(token.clone());
            axum::Json(json!({ "access_token": token })).into_response()
        }
        ExchangeReply::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, "exchange refused").into_response()
        }
        ExchangeReply::Json(value) => axum::Json(value).into_response(),
    }
}

async fn resource(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let n = state.resource_calls.fetch_add(1, Ordering::SeqCst) + 1;
    state.resource_requests.lock().push(headers);

    let reply = *state.resource_reply.lock();
    let rejected = match reply {
        ResourceReply::RejectFirst(count) => n <= count,
        ResourceReply::AlwaysUnauthorized => true,
    };
    if rejected {
        (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
    } else {
        (StatusCode::OK, "ok").into_response()
    }
}
