use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use storefront_core::{accounts::token_digest, new_session_key};
use storefront_db::UserRow;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{map_db_error, ApiError, AppState};

pub const SESSION_COOKIE: &str = "sessionid";
pub const SESSION_HEADER: &str = "x-session-key";
/// Two weeks, the lifetime of an anonymous cart session cookie.
const SESSION_COOKIE_MAX_AGE_SECS: u64 = 1_209_600;
const MAX_SESSION_KEY_LEN: usize = 128;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Cart session key for the current request, stored as a request extension.
#[derive(Debug, Clone)]
pub struct SessionKey(pub String);

/// The logged-in user behind a bearer token, stored as a request extension.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: UserRow,
    pub token_digest: String,
}

/// Operator API key settings for the admin routes.
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth config from `STOREFRONT_ADMIN_API_KEYS` (comma-separated bearer tokens).
    ///
    /// In development, empty/missing keys disable auth for local iteration.
    /// In non-development envs, empty/missing keys fail startup.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("STOREFRONT_ADMIN_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    pub(crate) fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "STOREFRONT_ADMIN_API_KEYS not set; admin auth disabled in development environment"
                );
                return Ok(Self {
                    api_keys: Arc::new(Vec::new()),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "STOREFRONT_ADMIN_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    fn allows(&self, token: &str) -> bool {
        self.api_keys
            .iter()
            .fold(false, |found, key| {
                found | bool::from(key.as_bytes().ct_eq(token.as_bytes()))
            })
    }
}

/// How the cart session cookie is issued.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub secure_cookies: bool,
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter keyed per client. Each router gets its own instance.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    clients: Arc<Mutex<HashMap<String, RateLimitWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request for `client`. Returns `false` once its window is full.
    async fn try_acquire(&self, client: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        clients.retain(|_, w| now.duration_since(w.started_at) < self.window);

        let window = clients
            .entry(client.to_owned())
            .or_insert(RateLimitWindow {
                started_at: now,
                count: 0,
            });
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.len()
    }
}

#[derive(Debug, Serialize)]
struct MiddlewareErrorBody {
    error: MiddlewareError,
}

#[derive(Debug, Serialize)]
struct MiddlewareError {
    code: &'static str,
    message: &'static str,
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
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

/// Resolve the cart session key from the `x-session-key` header or the
/// `sessionid` cookie. A request without a usable key gets a fresh one,
/// returned on the response as both a cookie and a header.
pub async fn session_key(
    State(config): State<SessionConfig>,
    mut req: Request,
    next: Next,
) -> Response {
    let presented = presented_session_key(req.headers());
    let issued = presented.is_none();
    let key = presented.unwrap_or_else(new_session_key);

    req.extensions_mut().insert(SessionKey(key.clone()));

    let mut res = next.run(req).await;

    if issued {
        tracing::debug!("issued new cart session key");
        if let Ok(val) = HeaderValue::from_str(&session_cookie(&key, config.secure_cookies)) {
            res.headers_mut().append(SET_COOKIE, val);
        }
        if let Ok(val) = HeaderValue::from_str(&key) {
            res.headers_mut().insert(SESSION_HEADER, val);
        }
    }

    res
}

/// Middleware resolving `Authorization: Bearer <token>` to a logged-in user.
pub async fn require_user(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let req_id = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone());

    let Some(token) = extract_bearer_token(req.headers().get(AUTHORIZATION)) else {
        return ApiError::new(req_id, "unauthorized", "login required").into_response();
    };
    let digest = token_digest(token);

    match storefront_db::find_session_user(&state.pool, &digest).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser {
                user,
                token_digest: digest,
            });
            next.run(req).await
        }
        Ok(None) => {
            ApiError::new(req_id, "unauthorized", "session expired or invalid").into_response()
        }
        Err(e) => map_db_error(req_id, &e).into_response(),
    }
}

/// Middleware enforcing operator bearer-key auth when enabled.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    let token = extract_bearer_token(req.headers().get(AUTHORIZATION));

    match token {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(MiddlewareErrorBody {
                error: MiddlewareError {
                    code: "unauthorized",
                    message: "missing or invalid bearer token",
                },
            }),
        )
            .into_response(),
    }
}

/// Middleware enforcing a fixed request-per-window limit for each client.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let client = rate_limit_key(&req);
    if !rate_limit.try_acquire(&client).await {
        tracing::debug!(client = %client, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(MiddlewareErrorBody {
                error: MiddlewareError {
                    code: "rate_limited",
                    message: "rate limit exceeded",
                },
            }),
        )
            .into_response();
    }

    next.run(req).await
}

/// Peer IP when the server exposes it, else the bearer token digest.
fn rate_limit_key(req: &Request) -> String {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("peer:{}", addr.ip());
    }
    match extract_bearer_token(req.headers().get(AUTHORIZATION)) {
        Some(token) => format!("token:{}", token_digest(token)),
        None => "anonymous".to_string(),
    }
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

fn presented_session_key(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    let from_cookie = || {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.trim())
    };

    from_header
        .filter(|k| is_valid_session_key(k))
        .or_else(|| from_cookie().filter(|k| is_valid_session_key(k)))
        .map(ToOwned::to_owned)
}

fn is_valid_session_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_SESSION_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn session_cookie(key: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={key}; Path=/; Max-Age={SESSION_COOKIE_MAX_AGE_SECS}; HttpOnly; SameSite=Lax"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
