mod account;
mod admin;
mod cart;
mod catalog;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use storefront_core::StoreError;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, require_user, session_key, AuthState,
    RateLimitState, RequestId, SessionConfig, SESSION_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Lifetime of a login token.
    pub session_ttl: chrono::Duration,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(request_id: String, data: T) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" | "insufficient_stock" => StatusCode::BAD_REQUEST,
            "conflict" | "invalid_transition" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Error code for a domain failure in the `{data, meta}` API surface.
fn store_error_code(error: &StoreError) -> &'static str {
    match error {
        StoreError::InvalidInput(_) => "validation_error",
        StoreError::NotFound { .. } => "not_found",
        StoreError::NoSizesAvailable | StoreError::InsufficientStock { .. } => {
            "insufficient_stock"
        }
        StoreError::InvalidTransition { .. } => "invalid_transition",
        StoreError::Conflict(_) => "conflict",
        StoreError::Unauthorized => "unauthorized",
    }
}

pub(crate) fn map_db_error(request_id: String, error: &storefront_db::DbError) -> ApiError {
    if let Some(store) = error.as_store() {
        return ApiError::new(request_id, store_error_code(store), store.user_message());
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

fn build_cors() -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("hx-request"),
            session_header.clone(),
        ])
        .expose_headers([session_header])
}

fn catalog_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/home", get(catalog::home))
        .route("/api/v1/catalog", get(catalog::list_catalog))
        .route(
            "/api/v1/catalog/{category_slug}",
            get(catalog::list_category),
        )
        .route("/api/v1/products/{slug}", get(catalog::get_product))
        .route("/api/v1/categories", get(catalog::list_categories))
        .route("/api/v1/sizes", get(catalog::list_sizes))
}

fn cart_router(sessions: SessionConfig) -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::view_cart))
        .route("/cart/add/{product_slug}", post(cart::add_to_cart))
        .route("/cart/items/{item_id}/update", post(cart::update_item))
        .route("/cart/items/{item_id}/remove", post(cart::remove_item))
        .route("/cart/count", get(cart::cart_count))
        .route("/cart/clear", post(cart::clear_cart))
        .layer(axum::middleware::from_fn_with_state(sessions, session_key))
}

fn account_router(
    state: &AppState,
    sessions: SessionConfig,
    rate_limit: RateLimitState,
) -> Router<AppState> {
    let authenticated = Router::new()
        .route("/api/v1/users/logout", post(account::logout))
        .route(
            "/api/v1/users/me",
            get(account::get_profile).patch(account::update_profile),
        )
        .route("/api/v1/users/me/orders", get(account::list_orders))
        .route("/api/v1/users/me/orders/{order_id}", get(account::get_order))
        .route(
            "/api/v1/checkout",
            post(account::checkout)
                .layer(axum::middleware::from_fn_with_state(sessions, session_key)),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_user,
        ));

    Router::new()
        .route("/api/v1/users/register", post(account::register))
        .route("/api/v1/users/login", post(account::login))
        .merge(authenticated)
        .layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ))
}

fn admin_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/admin/orders/{order_id}/status",
            patch(admin::update_order_status),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

/// Assemble every router. Account and admin routes take separate limiters
/// so customer traffic cannot exhaust the operator's budget.
pub fn build_app(
    state: AppState,
    auth: AuthState,
    account_limit: RateLimitState,
    admin_limit: RateLimitState,
    sessions: SessionConfig,
) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(catalog_router())
        .merge(cart_router(sessions))
        .merge(account_router(&state, sessions, account_limit))
        .merge(admin_router(auth, admin_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match storefront_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
pub(crate) mod test_support;
