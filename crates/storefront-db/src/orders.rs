//! Orders: placement from a session cart and status changes that move stock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use storefront_core::{
    check_add_quantity, transition, CartLine, CartSummary, OrderLine, OrderStatus, StockDelta,
    StoreError,
};

use crate::carts::{clear_cart_in, lock_cart};
use crate::DbError;

const ORDER_COLUMNS: &str = "id, user_id, status, full_name, address, city, postal_code, phone, \
     total_price, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderRow {
    pub id: i64,
    pub user_id: i64,
    /// One of the [`OrderStatus`] labels; the column carries a `CHECK` constraint.
    pub status: String,
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: Option<String>,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// # Errors
    ///
    /// [`StoreError::InvalidInput`] if the stored label is not a known status.
    pub fn status(&self) -> Result<OrderStatus, StoreError> {
        self.status.parse()
    }
}

/// An order item joined with the product and size names.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub product_slug: String,
    pub product_size_id: i64,
    pub size_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub line_total: Decimal,
}

/// Where an order ships to.
#[derive(Debug, Clone)]
pub struct ShippingDetails {
    pub full_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: Option<String>,
}

impl ShippingDetails {
    fn validated(&self) -> Result<Self, StoreError> {
        let required = [
            ("full_name", &self.full_name),
            ("address", &self.address),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(StoreError::InvalidInput(format!("{field} is required")));
        }
        Ok(Self {
            full_name: self.full_name.trim().to_string(),
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            phone: self
                .phone
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }
}

/// Outcome of [`update_order_status`]: the saved order, the status it left,
/// and the stock changes applied alongside it.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order: OrderRow,
    pub previous: OrderStatus,
    pub deltas: Vec<StockDelta>,
}

#[derive(Debug, sqlx::FromRow)]
struct CheckoutLine {
    product_id: i64,
    product_size_id: i64,
    quantity: i32,
    price: Decimal,
}

// ---------------------------------------------------------------------------
// Placement
// ---------------------------------------------------------------------------

/// Turn the cart into a `pending` order for `user_id` and empty the cart.
///
/// Item prices are snapshotted from the products at this moment. Each line
/// is rechecked against its size's stock under lock; stock itself is only
/// taken when the order enters a consuming status.
///
/// # Errors
///
/// - [`StoreError::InvalidInput`] for an empty cart or missing shipping fields
/// - [`StoreError::InsufficientStock`] when a line no longer fits in stock
/// - [`DbError::Sqlx`] on query failure
pub async fn place_order_from_cart(
    pool: &PgPool,
    cart_id: i64,
    user_id: i64,
    shipping: &ShippingDetails,
) -> Result<OrderRow, DbError> {
    let shipping = shipping.validated()?;

    let mut tx = pool.begin().await?;
    lock_cart(&mut tx, cart_id).await?;

    let lines = sqlx::query_as::<_, CheckoutLine>(
        "SELECT ci.product_id, ci.product_size_id, ci.quantity, p.price \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         WHERE ci.cart_id = $1 \
         ORDER BY ci.product_size_id",
    )
    .bind(cart_id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
        return Err(StoreError::InvalidInput("Cart is empty".to_string()).into());
    }

    let size_ids: Vec<i64> = lines.iter().map(|l| l.product_size_id).collect();
    let stocks = sqlx::query_as::<_, (i64, i32)>(
        "SELECT id, stock FROM product_sizes WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&size_ids)
    .fetch_all(&mut *tx)
    .await?;

    for line in &lines {
        let stock = stocks
            .iter()
            .find(|(id, _)| *id == line.product_size_id)
            .map_or(0, |(_, stock)| *stock);
        check_add_quantity(line.quantity, stock)?;
    }

    let total = CartSummary::from_lines(
        &lines
            .iter()
            .map(|l| CartLine {
                quantity: l.quantity,
                unit_price: l.price,
            })
            .collect::<Vec<_>>(),
    )
    .subtotal;

    let order = sqlx::query_as::<_, OrderRow>(&format!(
        "INSERT INTO orders (user_id, status, full_name, address, city, postal_code, phone, total_price) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(OrderStatus::Pending.as_str())
    .bind(&shipping.full_name)
    .bind(&shipping.address)
    .bind(&shipping.city)
    .bind(&shipping.postal_code)
    .bind(&shipping.phone)
    .bind(total)
    .fetch_one(&mut *tx)
    .await?;

    for line in &lines {
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, product_size_id, quantity, price) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(order.id)
        .bind(line.product_id)
        .bind(line.product_size_id)
        .bind(line.quantity)
        .bind(line.price)
        .execute(&mut *tx)
        .await?;
    }

    clear_cart_in(&mut tx, cart_id).await?;
    tx.commit().await?;

    tracing::info!(
        order_id = order.id,
        user_id,
        items = lines.len(),
        total = %order.total_price,
        "order placed"
    );

    Ok(order)
}

// ---------------------------------------------------------------------------
// Status changes
// ---------------------------------------------------------------------------

/// Move an order to `new_status`, applying the implied stock deltas in the
/// same transaction.
///
/// # Errors
///
/// - [`StoreError::NotFound`] for an unknown order
/// - [`StoreError::InvalidTransition`] when a consuming order is moved back to `pending`
/// - [`StoreError::InsufficientStock`] when a debit would drive stock negative
/// - [`DbError::Sqlx`] on query failure
///
/// Nothing is written on error.
pub async fn update_order_status(
    pool: &PgPool,
    order_id: i64,
    new_status: OrderStatus,
) -> Result<StatusChange, DbError> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::not_found("Order"))?;
    let previous = current.status()?;

    let lines = sqlx::query_as::<_, (i64, i32)>(
        "SELECT product_size_id, quantity FROM order_items WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .map(|(product_size_id, quantity)| OrderLine {
        product_size_id,
        quantity,
    })
    .collect::<Vec<_>>();

    let change = transition(previous, new_status, &lines)?;
    for delta in &change.deltas {
        apply_stock_delta(&mut tx, delta).await?;
    }

    let order = sqlx::query_as::<_, OrderRow>(&format!(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order_id)
    .bind(new_status.as_str())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        order_id,
        from = %previous,
        to = %new_status,
        stock_deltas = change.deltas.len(),
        "order status updated"
    );

    Ok(StatusChange {
        order,
        previous,
        deltas: change.deltas,
    })
}

async fn apply_stock_delta(conn: &mut PgConnection, delta: &StockDelta) -> Result<(), DbError> {
    let stock = sqlx::query_scalar::<_, i32>(
        "SELECT stock FROM product_sizes WHERE id = $1 FOR UPDATE",
    )
    .bind(delta.product_size_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| StoreError::not_found("Size"))?;

    let insufficient = StoreError::InsufficientStock {
        requested: -delta.delta,
        available: stock,
        in_cart: 0,
    };
    if stock + delta.delta < 0 {
        return Err(insufficient.into());
    }

    let result = sqlx::query(
        "UPDATE product_sizes SET stock = stock + $2 \
         WHERE id = $1 AND stock + $2 >= 0",
    )
    .bind(delta.product_size_id)
    .bind(delta.delta)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(insufficient.into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch any order by id. `None` when it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_order(pool: &PgPool, order_id: i64) -> Result<Option<OrderRow>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// A user's orders, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_orders_for_user(pool: &PgPool, user_id: i64) -> Result<Vec<OrderRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fetch an order only if it belongs to `user_id`. Another user's order is
/// indistinguishable from a missing one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_order_for_user(
    pool: &PgPool,
    user_id: i64,
    order_id: i64,
) -> Result<Option<OrderRow>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
    ))
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Items of an order with product and size names.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_order_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItemRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
        "SELECT oi.id, oi.order_id, oi.product_id, p.name AS product_name, \
                p.slug AS product_slug, oi.product_size_id, s.name AS size_name, \
                oi.quantity, oi.price, (oi.price * oi.quantity) AS line_total \
         FROM order_items oi \
         JOIN products p ON p.id = oi.product_id \
         JOIN product_sizes ps ON ps.id = oi.product_size_id \
         JOIN sizes s ON s.id = ps.size_id \
         WHERE oi.order_id = $1 \
         ORDER BY oi.id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            full_name: " Olena Koval ".to_string(),
            address: "12 Khreshchatyk St".to_string(),
            city: "Kyiv".to_string(),
            postal_code: "01001".to_string(),
            phone: Some("  ".to_string()),
        }
    }

    #[test]
    fn shipping_is_trimmed_and_blank_phone_dropped() {
        let s = shipping().validated().unwrap();
        assert_eq!(s.full_name, "Olena Koval");
        assert!(s.phone.is_none());
    }

    #[test]
    fn shipping_requires_address_fields() {
        let mut s = shipping();
        s.city = String::new();
        let err = s.validated().unwrap_err();
        assert_eq!(err, StoreError::InvalidInput("city is required".to_string()));
    }
}
