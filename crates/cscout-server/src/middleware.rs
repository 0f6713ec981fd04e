//! Request middleware: request-id propagation, bearer-token auth, and a
//! per-client fixed-window rate limit.
//!
//! The limiter is keyed by bearer token because the traffic that matters
//! here is authenticated job polling — one chatty watcher must not starve
//! the other API consumers. Unauthenticated callers (dev mode) share a
//! per-address bucket instead.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use cscout_core::{AppConfig, Environment};

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Bearer-token auth settings shared by the protected routes.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<HashSet<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth from the app config's API key set.
    ///
    /// In development an empty key set disables auth for local iteration;
    /// anywhere else it fails startup.
    ///
    /// # Errors
    ///
    /// Returns an error when no keys are configured outside development.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let allow_open = matches!(config.env, Environment::Development);
        Self::from_keys(config.api_keys.iter().cloned(), allow_open)
    }

    /// # Errors
    ///
    /// Returns an error when `keys` is empty and `allow_open` is false.
    pub fn from_keys(
        keys: impl IntoIterator<Item = String>,
        allow_open: bool,
    ) -> anyhow::Result<Self> {
        let keys: HashSet<String> = keys.into_iter().collect();

        if keys.is_empty() {
            if allow_open {
                tracing::warn!("no API keys configured; bearer auth disabled in development");
                return Ok(Self::disabled());
            }
            anyhow::bail!(
                "CSCOUT_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    /// Auth turned off entirely, as in a dev environment with no keys.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            api_keys: Arc::new(HashSet::new()),
            enabled: false,
        }
    }

    fn allows(&self, token: &str) -> bool {
        self.api_keys.contains(token)
    }
}

struct ClientWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window request limiter, one window per client key.
#[derive(Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, ClientWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Counts one request against `client`'s current window. Returns `false`
    /// when the window is already full.
    async fn try_acquire(&self, client: &str) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        // Expired windows reset by removal; this also keeps the map from
        // accumulating clients that stopped calling.
        windows.retain(|_, w| now.duration_since(w.started_at) < self.window);

        let window = windows
            .entry(client.to_owned())
            .or_insert_with(|| ClientWindow {
                started_at: now,
                count: 0,
            });
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

/// Axum middleware that extracts or generates a request ID.
///
/// An incoming `x-request-id` header is reused; otherwise a fresh `UUIDv4`
/// is generated. The ID lands in request extensions as [`RequestId`] and on
/// the response as `x-request-id`.
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing bearer-token auth when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => reject(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid bearer token",
        ),
    }
}

/// Middleware enforcing the per-client request budget.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_key(&req);
    if rate_limit.try_acquire(&client).await {
        next.run(req).await
    } else {
        reject(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded",
        )
    }
}

/// The limiter key for one request: the bearer token when present, else the
/// forwarded client address, else a shared anonymous bucket.
fn client_key(req: &Request) -> String {
    if let Some(token) = extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        return format!("token:{token}");
    }
    req.headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map_or_else(
            || "anonymous".to_owned(),
            |addr| format!("addr:{}", addr.trim()),
        )
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

fn reject(status: StatusCode, code: &'static str, message: &'static str) -> Response {
    let body = serde_json::json!({ "error": { "code": code, "message": message } });
    (status, Json(body)).into_response()
}
