use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use storefront_core::{
    accounts::{generate_session_token, hash_password, token_digest, verify_password_or_dummy},
    OrderStatus, PasswordError, Registration,
};
use storefront_db::{NewUser, OrderItemRow, OrderRow, ProfileUpdate, ShippingDetails, UserRow};

use crate::middleware::{CurrentUser, RequestId, SessionKey};

use super::{map_db_error, ApiError, ApiResponse, AppState};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ProfileRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
}

/// Shipping fields for checkout. Anything omitted is taken from the profile.
#[derive(Debug, Default, Deserialize)]
pub(super) struct CheckoutRequest {
    full_name: Option<String>,
    address: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    phone: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct UserItem {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct SessionData {
    token: String,
    expires_at: DateTime<Utc>,
    user: UserItem,
}

#[derive(Debug, Serialize)]
pub(super) struct LogoutData {
    logged_out: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderSummary {
    id: i64,
    status: OrderStatus,
    full_name: String,
    address: String,
    city: String,
    postal_code: String,
    phone: Option<String>,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderLineItem {
    id: i64,
    product_id: i64,
    product_name: String,
    product_slug: String,
    size_id: i64,
    size_name: String,
    quantity: i32,
    price: Decimal,
    line_total: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct OrderDetail {
    #[serde(flatten)]
    order: OrderSummary,
    items: Vec<OrderLineItem>,
}

impl From<UserRow> for UserItem {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            address: row.address,
            city: row.city,
            postal_code: row.postal_code,
            created_at: row.created_at,
        }
    }
}

impl OrderSummary {
    /// Rows carry the status as stored text; the CHECK constraint keeps it
    /// to known labels.
    pub(super) fn from_row(req_id: &str, row: OrderRow) -> Result<Self, ApiError> {
        let status = row
            .status()
            .map_err(|e| map_db_error(req_id.to_string(), &e.into()))?;
        Ok(Self {
            id: row.id,
            status,
            full_name: row.full_name,
            address: row.address,
            city: row.city,
            postal_code: row.postal_code,
            phone: row.phone,
            total_price: row.total_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl From<OrderItemRow> for OrderLineItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_slug: row.product_slug,
            size_id: row.product_size_id,
            size_name: row.size_name,
            quantity: row.quantity,
            price: row.price,
            line_total: row.line_total,
        }
    }
}

impl From<ProfileRequest> for ProfileUpdate {
    fn from(req: ProfileRequest) -> Self {
        Self {
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
            address: req.address,
            city: req.city,
            postal_code: req.postal_code,
        }
    }
}

impl CheckoutRequest {
    fn into_shipping(self, user: &UserRow) -> ShippingDetails {
        let full_name = format!("{} {}", user.first_name, user.last_name);
        ShippingDetails {
            full_name: self.full_name.unwrap_or_else(|| full_name.trim().to_string()),
            address: self
                .address
                .or_else(|| user.address.clone())
                .unwrap_or_default(),
            city: self.city.or_else(|| user.city.clone()).unwrap_or_default(),
            postal_code: self
                .postal_code
                .or_else(|| user.postal_code.clone())
                .unwrap_or_default(),
            phone: self.phone.or_else(|| user.phone.clone()),
        }
    }
}

fn password_failure(req_id: String, error: &PasswordError) -> ApiError {
    tracing::error!(error = %error, "password hashing failed");
    ApiError::new(req_id, "internal_error", "could not process credentials")
}

/// Run argon2 work off the async executor.
async fn blocking<T, F>(req_id: &str, work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(password_failure(req_id.to_string(), &e)),
        Err(e) => {
            tracing::error!(error = %e, "password task panicked");
            Err(ApiError::new(
                req_id,
                "internal_error",
                "could not process credentials",
            ))
        }
    }
}

async fn start_session(
    state: &AppState,
    req_id: &str,
    user: UserRow,
) -> Result<SessionData, ApiError> {
    let token = generate_session_token();
    let expires_at = storefront_db::create_user_session(
        &state.pool,
        user.id,
        &token_digest(&token),
        state.session_ttl,
    )
    .await
    .map_err(|e| map_db_error(req_id.to_string(), &e))?;

    Ok(SessionData {
        token,
        expires_at,
        user: user.into(),
    })
}

async fn order_detail(
    state: &AppState,
    req_id: &str,
    order: OrderRow,
) -> Result<OrderDetail, ApiError> {
    let items = storefront_db::list_order_items(&state.pool, order.id)
        .await
        .map_err(|e| map_db_error(req_id.to_string(), &e))?;

    Ok(OrderDetail {
        order: OrderSummary::from_row(req_id, order)?,
        items: items.into_iter().map(OrderLineItem::from).collect(),
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(super) async fn register(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<Registration>,
) -> Result<(StatusCode, Json<ApiResponse<SessionData>>), ApiError> {
    let registration = body
        .validated()
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.user_message()))?;

    let password = registration.password;
    let password_hash = blocking(&req_id.0, move || hash_password(&password)).await?;

    let user = storefront_db::create_user(
        &state.pool,
        &NewUser {
            email: registration.email,
            password_hash,
            first_name: registration.first_name,
            last_name: registration.last_name,
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(user_id = user.id, "user registered");
    let session = start_session(&state, &req_id.0, user).await?;
    Ok((StatusCode::CREATED, ApiResponse::new(req_id.0, session)))
}

pub(super) async fn login(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<ApiResponse<SessionData>>, ApiError> {
    let unauthorized = || ApiError::new(req_id.0.clone(), "unauthorized", INVALID_CREDENTIALS);

    let credentials = storefront_db::get_user_credentials_by_email(&state.pool, &body.email)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    // Unknown emails still pay for one argon2 verification.
    let stored_hash = credentials.as_ref().map(|c| c.password_hash.clone());
    let password = body.password;
    let verified = blocking(&req_id.0, move || {
        verify_password_or_dummy(stored_hash.as_deref(), &password)
    })
    .await?;
    let Some(credentials) = credentials else {
        tracing::debug!("login rejected: unknown email");
        return Err(unauthorized());
    };
    if !verified {
        tracing::debug!(user_id = credentials.id, "login rejected");
        return Err(unauthorized());
    }

    let user = storefront_db::get_user(&state.pool, credentials.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(unauthorized)?;

    let session = start_session(&state, &req_id.0, user).await?;
    Ok(ApiResponse::new(req_id.0, session))
}

pub(super) async fn logout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<LogoutData>>, ApiError> {
    let logged_out = storefront_db::delete_user_session(&state.pool, &current.token_digest)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, LogoutData { logged_out }))
}

pub(super) async fn get_profile(
    Extension(req_id): Extension<RequestId>,
    Extension(current): Extension<CurrentUser>,
) -> Json<ApiResponse<UserItem>> {
    ApiResponse::new(req_id.0, current.user.into())
}

pub(super) async fn update_profile(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<ProfileRequest>,
) -> Result<Json<ApiResponse<UserItem>>, ApiError> {
    let user = storefront_db::update_user_profile(&state.pool, current.user.id, &body.into())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, user.into()))
}

pub(super) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<OrderSummary>>>, ApiError> {
    let rows = storefront_db::list_orders_for_user(&state.pool, current.user.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let orders = rows
        .into_iter()
        .map(|row| OrderSummary::from_row(&req_id.0, row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ApiResponse::new(req_id.0, orders))
}

pub(super) async fn get_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(current): Extension<CurrentUser>,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<OrderDetail>>, ApiError> {
    let order = storefront_db::get_order_for_user(&state.pool, current.user.id, order_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "Order not found"))?;

    let detail = order_detail(&state, &req_id.0, order).await?;
    Ok(ApiResponse::new(req_id.0, detail))
}

pub(super) async fn checkout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(current): Extension<CurrentUser>,
    Extension(session): Extension<SessionKey>,
    body: Option<Json<CheckoutRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ApiError> {
    let shipping = body
        .map(|Json(req)| req)
        .unwrap_or_default()
        .into_shipping(&current.user);

    let cart = storefront_db::get_or_create_cart(&state.pool, &session.0)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let order =
        storefront_db::place_order_from_cart(&state.pool, cart.id, current.user.id, &shipping)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let detail = order_detail(&state, &req_id.0, order).await?;
    Ok((StatusCode::CREATED, ApiResponse::new(req_id.0, detail)))
}

#[cfg(test)]
#[path = "account_test.rs"]
mod tests;
