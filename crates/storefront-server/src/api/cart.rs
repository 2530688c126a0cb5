//! Session cart endpoints. These answer with bare JSON bodies (`{error}` on
//! failure) rather than the `{data, meta}` envelope, since the storefront
//! client swaps them straight into the page.

use std::collections::{BTreeMap, HashMap};

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, Path, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Form, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use storefront_core::StoreError;
use storefront_db::{CartItemView, CartRow, DbError};

use crate::middleware::SessionKey;

use super::AppState;

const MAX_FORM_BYTES: usize = 64 * 1024;
const REQUIRED: &str = "This field is required.";
const NOT_A_NUMBER: &str = "Enter a whole number.";
const BELOW_MIN: &str = "Ensure this value is greater than or equal to 1.";
const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CartErrorBody {
    error: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<&'static str, Vec<String>>,
}

#[derive(Debug)]
pub(super) struct CartError {
    status: StatusCode,
    body: CartErrorBody,
}

impl CartError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: CartErrorBody {
                error: message.into(),
                errors: BTreeMap::new(),
            },
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn invalid_form(errors: BTreeMap<&'static str, Vec<String>>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: CartErrorBody {
                error: "Invalid form data".to_string(),
                errors,
            },
        }
    }

    fn internal(error: &DbError) -> Self {
        tracing::error!(error = %error, "cart query failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    }
}

impl IntoResponse for CartError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Domain failures become 400s carrying the customer-facing message; an
/// unknown product is a 404.
fn map_cart_error(error: &DbError) -> CartError {
    match error.as_store() {
        Some(StoreError::NotFound { entity: "Product" }) => {
            CartError::new(StatusCode::NOT_FOUND, "Product not found")
        }
        Some(store) => CartError::bad_request(store.user_message()),
        None => CartError::internal(error),
    }
}

// ---------------------------------------------------------------------------
// Form input
// ---------------------------------------------------------------------------

/// Submitted fields as strings, from either a urlencoded form or a JSON
/// object. An empty body yields no fields.
#[derive(Debug, Default)]
pub(super) struct FormFields(HashMap<String, String>);

impl FormFields {
    fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

impl<S> FromRequest<S> for FormFields
where
    S: Send + Sync,
{
    type Rejection = CartError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = is_json(req.headers());
        let (parts, body) = req.into_parts();
        let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES)
            .await
            .map_err(|_| CartError::bad_request("Invalid form data"))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        if is_json {
            return json_fields(&bytes).map(Self);
        }

        let req = Request::from_parts(parts, Body::from(bytes));
        let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
            .await
            .map_err(|_| CartError::bad_request("Invalid form data"))?;
        Ok(Self(fields))
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

fn json_fields(bytes: &Bytes) -> Result<HashMap<String, String>, CartError> {
    let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)
        .map_err(|_| CartError::bad_request("Invalid form data"))?;

    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

/// A validated add-to-cart submission.
#[derive(Debug, PartialEq, Eq)]
struct AddToCartForm {
    size_id: Option<i64>,
    quantity: i32,
}

impl AddToCartForm {
    /// `size_id` is optional, but when present it must be one of `choices`
    /// (the product's in-stock sizes).
    fn parse(
        fields: &FormFields,
        choices: &[i64],
    ) -> Result<Self, BTreeMap<&'static str, Vec<String>>> {
        let mut errors = BTreeMap::new();

        let quantity = match fields.get("quantity").map(str::parse::<i32>) {
            None => Err(REQUIRED),
            Some(Err(_)) => Err(NOT_A_NUMBER),
            Some(Ok(q)) if q < 1 => Err(BELOW_MIN),
            Some(Ok(q)) => Ok(q),
        };
        let size_id = match fields.get("size_id").map(str::parse::<i64>) {
            None => Ok(None),
            Some(Ok(id)) if choices.contains(&id) => Ok(Some(id)),
            Some(_) => Err(INVALID_CHOICE),
        };

        if let Err(msg) = quantity {
            errors.insert("quantity", vec![msg.to_string()]);
        }
        if let Err(msg) = size_id {
            errors.insert("size_id", vec![msg.to_string()]);
        }

        match (quantity, size_id) {
            (Ok(quantity), Ok(size_id)) => Ok(Self { size_id, quantity }),
            _ => Err(errors),
        }
    }
}

/// Quantity for an absolute edit. Missing means 1.
fn parse_update_quantity(fields: &FormFields) -> Result<i32, CartError> {
    fields.get("quantity").map_or(Ok(1), |raw| {
        raw.parse::<i32>()
            .map_err(|_| CartError::bad_request("Invalid quantity format"))
    })
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct CartItemBody {
    id: i64,
    product_id: i64,
    product_name: String,
    product_slug: String,
    main_image: String,
    size_id: i64,
    size_name: String,
    stock: i32,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
    added_at: DateTime<Utc>,
}

/// The cart as the client renders it.
#[derive(Debug, Serialize)]
pub(super) struct CartView {
    items: Vec<CartItemBody>,
    total_items: i64,
    subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct AddedBody {
    success: bool,
    total_items: i64,
    message: String,
    cart_item_id: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct CountBody {
    total_items: i64,
    subtotal: Decimal,
}

#[derive(Debug, Serialize)]
pub(super) struct ClearedBody {
    success: bool,
    message: &'static str,
}

impl From<CartItemView> for CartItemBody {
    fn from(view: CartItemView) -> Self {
        Self {
            id: view.id,
            product_id: view.product_id,
            product_name: view.product_name,
            product_slug: view.product_slug,
            main_image: view.main_image,
            size_id: view.product_size_id,
            size_name: view.size_name,
            stock: view.stock,
            quantity: view.quantity,
            unit_price: view.unit_price,
            line_total: view.line_total,
            added_at: view.added_at,
        }
    }
}

async fn resolve_cart(state: &AppState, session: &SessionKey) -> Result<CartRow, CartError> {
    storefront_db::get_or_create_cart(&state.pool, &session.0)
        .await
        .map_err(|e| map_cart_error(&e))
}

async fn cart_view(state: &AppState, cart_id: i64) -> Result<CartView, CartError> {
    let items = storefront_db::list_cart_items(&state.pool, cart_id)
        .await
        .map_err(|e| map_cart_error(&e))?;
    let summary = storefront_db::cart_summary(&state.pool, cart_id)
        .await
        .map_err(|e| map_cart_error(&e))?;

    Ok(CartView {
        items: items.into_iter().map(CartItemBody::from).collect(),
        total_items: summary.total_items,
        subtotal: summary.subtotal,
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(super) async fn view_cart(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
) -> Result<Json<CartView>, CartError> {
    let cart = resolve_cart(&state, &session).await?;
    Ok(Json(cart_view(&state, cart.id).await?))
}

pub(super) async fn add_to_cart(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    Path(product_slug): Path<String>,
    fields: FormFields,
) -> Result<Json<AddedBody>, CartError> {
    let cart = resolve_cart(&state, &session).await?;

    let product = storefront_db::get_product_by_slug(&state.pool, &product_slug)
        .await
        .map_err(|e| map_cart_error(&e))?
        .ok_or_else(|| CartError::new(StatusCode::NOT_FOUND, "Product not found"))?;

    let choices: Vec<i64> = storefront_db::list_product_sizes(&state.pool, product.id)
        .await
        .map_err(|e| map_cart_error(&e))?
        .into_iter()
        .filter(|size| size.stock > 0)
        .map(|size| size.id)
        .collect();

    let form = AddToCartForm::parse(&fields, &choices).map_err(CartError::invalid_form)?;

    let added = storefront_db::add_item(
        &state.pool,
        cart.id,
        &product.slug,
        form.size_id,
        form.quantity,
    )
    .await
    .map_err(|e| map_cart_error(&e))?;

    Ok(Json(AddedBody {
        success: true,
        total_items: added.summary.total_items,
        message: format!("{} added to cart", product.name),
        cart_item_id: added.item.id,
    }))
}

pub(super) async fn update_item(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    Path(item_id): Path<i64>,
    fields: FormFields,
) -> Result<Json<CartView>, CartError> {
    let cart = resolve_cart(&state, &session).await?;
    let quantity = parse_update_quantity(&fields)?;

    storefront_db::update_item_quantity(&state.pool, cart.id, item_id, quantity)
        .await
        .map_err(|e| match e.as_store() {
            Some(StoreError::NotFound { .. }) => {
                CartError::new(StatusCode::NOT_FOUND, "Item not found")
            }
            _ => map_cart_error(&e),
        })?;

    Ok(Json(cart_view(&state, cart.id).await?))
}

pub(super) async fn remove_item(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    Path(item_id): Path<i64>,
) -> Result<Json<CartView>, CartError> {
    let cart = resolve_cart(&state, &session).await?;

    storefront_db::remove_item(&state.pool, cart.id, item_id)
        .await
        .map_err(|e| match e.as_store() {
            Some(StoreError::NotFound { .. }) => CartError::bad_request("Item not found"),
            _ => map_cart_error(&e),
        })?;

    Ok(Json(cart_view(&state, cart.id).await?))
}

pub(super) async fn cart_count(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
) -> Result<Json<CountBody>, CartError> {
    let cart = resolve_cart(&state, &session).await?;
    let summary = storefront_db::cart_summary(&state.pool, cart.id)
        .await
        .map_err(|e| map_cart_error(&e))?;

    Ok(Json(CountBody {
        total_items: summary.total_items,
        subtotal: summary.subtotal,
    }))
}

pub(super) async fn clear_cart(
    State(state): State<AppState>,
    Extension(session): Extension<SessionKey>,
    headers: HeaderMap,
) -> Result<Response, CartError> {
    let cart = resolve_cart(&state, &session).await?;
    let removed = storefront_db::clear_cart(&state.pool, cart.id)
        .await
        .map_err(|e| map_cart_error(&e))?;
    tracing::debug!(cart_id = cart.id, removed, "cart cleared");

    if headers.contains_key("hx-request") {
        return Ok(Json(cart_view(&state, cart.id).await?).into_response());
    }
    Ok(Json(ClearedBody {
        success: true,
        message: "Cart cleared",
    })
    .into_response())
}

#[cfg(test)]
#[path = "cart_test.rs"]
mod tests;
