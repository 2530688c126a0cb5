//! Session carts and their line items.
//!
//! Every mutation runs in one transaction and locks rows in a fixed order:
//! the `carts` row, then the `product_sizes` row whose stock decides the
//! outcome, then the `cart_items` row. Stock is always read under that lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use storefront_core::{
    check_add_quantity, check_merge_quantity, check_set_quantity, CartLine, CartSummary,
    QuantityChange, StoreError,
};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartRow {
    pub id: i64,
    pub session_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemRow {
    pub id: i64,
    pub cart_id: i64,
    pub product_id: i64,
    pub product_size_id: i64,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
}

/// A cart line joined with the product and size it refers to.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartItemView {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub product_slug: String,
    pub main_image: String,
    pub unit_price: Decimal,
    pub product_size_id: i64,
    pub size_name: String,
    pub stock: i32,
    pub quantity: i32,
    pub line_total: Decimal,
    pub added_at: DateTime<Utc>,
}

/// Result of [`add_item`]: the inserted or merged line and the cart totals
/// after the write.
#[derive(Debug, Clone)]
pub struct AddedItem {
    pub item: CartItemRow,
    pub merged: bool,
    pub summary: CartSummary,
}

#[derive(Debug, sqlx::FromRow)]
struct LockedSize {
    id: i64,
    stock: i32,
}

// ---------------------------------------------------------------------------
// Cart resolution
// ---------------------------------------------------------------------------

/// Return the cart for `session_key`, creating it on first use.
///
/// Concurrent first requests for the same key converge on one row.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] for a blank key, or [`DbError::Sqlx`]
/// if the upsert fails.
pub async fn get_or_create_cart(pool: &PgPool, session_key: &str) -> Result<CartRow, DbError> {
    if session_key.trim().is_empty() {
        return Err(StoreError::InvalidInput("session key is required".to_string()).into());
    }

    let row = sqlx::query_as::<_, CartRow>(
        "INSERT INTO carts (session_key) VALUES ($1) \
         ON CONFLICT (session_key) DO UPDATE SET session_key = EXCLUDED.session_key \
         RETURNING id, session_key, created_at, updated_at",
    )
    .bind(session_key)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// Add `quantity` units of a product to the cart.
///
/// With `product_size_id` the line uses that size, which must belong to the
/// product. Without it the lowest-id `product_sizes` row with stock is chosen. An
/// existing line for the same product and size is merged into.
///
/// # Errors
///
/// - [`StoreError::InvalidInput`] when `quantity < 1`
/// - [`StoreError::NotFound`] for an unknown product or a size not offered for it
/// - [`StoreError::NoSizesAvailable`] when no size is given and none has stock
/// - [`StoreError::InsufficientStock`] when the new or merged quantity exceeds stock
/// - [`DbError::Sqlx`] on query failure
pub async fn add_item(
    pool: &PgPool,
    cart_id: i64,
    product_slug: &str,
    product_size_id: Option<i64>,
    quantity: i32,
) -> Result<AddedItem, DbError> {
    if quantity < 1 {
        return Err(StoreError::InvalidInput("Quantity must be at least 1".to_string()).into());
    }

    let mut tx = pool.begin().await?;
    lock_cart(&mut tx, cart_id).await?;

    let product_id =
        sqlx::query_scalar::<_, i64>("SELECT id FROM products WHERE slug = $1")
            .bind(product_slug)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::not_found("Product"))?;

    let size = match product_size_id {
        Some(id) => sqlx::query_as::<_, LockedSize>(
            "SELECT id, stock FROM product_sizes \
             WHERE id = $1 AND product_id = $2 \
             FOR UPDATE",
        )
        .bind(id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("Size"))?,
        None => sqlx::query_as::<_, LockedSize>(
            "SELECT id, stock FROM product_sizes \
             WHERE product_id = $1 AND stock > 0 \
             ORDER BY id \
             LIMIT 1 \
             FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NoSizesAvailable)?,
    };

    let existing = sqlx::query_as::<_, CartItemRow>(
        "SELECT id, cart_id, product_id, product_size_id, quantity, added_at \
         FROM cart_items \
         WHERE cart_id = $1 AND product_id = $2 AND product_size_id = $3 \
         FOR UPDATE",
    )
    .bind(cart_id)
    .bind(product_id)
    .bind(size.id)
    .fetch_optional(&mut *tx)
    .await?;

    let (item, merged) = if let Some(line) = existing {
        let new_quantity = check_merge_quantity(line.quantity, quantity, size.stock)?;
        let item = sqlx::query_as::<_, CartItemRow>(
            "UPDATE cart_items SET quantity = $2 WHERE id = $1 \
             RETURNING id, cart_id, product_id, product_size_id, quantity, added_at",
        )
        .bind(line.id)
        .bind(new_quantity)
        .fetch_one(&mut *tx)
        .await?;
        (item, true)
    } else {
        check_add_quantity(quantity, size.stock)?;
        let item = sqlx::query_as::<_, CartItemRow>(
            "INSERT INTO cart_items (cart_id, product_id, product_size_id, quantity) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, cart_id, product_id, product_size_id, quantity, added_at",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(size.id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;
        (item, false)
    };

    touch_cart(&mut tx, cart_id).await?;
    let summary = summary_in(&mut tx, cart_id).await?;
    tx.commit().await?;

    tracing::debug!(
        cart_id,
        cart_item_id = item.id,
        product_size_id = item.product_size_id,
        quantity = item.quantity,
        merged,
        "cart item added"
    );

    Ok(AddedItem {
        item,
        merged,
        summary,
    })
}

/// Set a line's quantity to an absolute value. Zero removes the line.
///
/// Returns the updated line, or `None` when it was removed. On any error the
/// line is left unchanged.
///
/// # Errors
///
/// - [`StoreError::InvalidInput`] for a negative quantity
/// - [`StoreError::NotFound`] when the item is not in this cart
/// - [`StoreError::InsufficientStock`] when the quantity exceeds stock
/// - [`DbError::Sqlx`] on query failure
pub async fn update_item_quantity(
    pool: &PgPool,
    cart_id: i64,
    item_id: i64,
    quantity: i32,
) -> Result<Option<CartItemRow>, DbError> {
    if quantity < 0 {
        return Err(StoreError::InvalidInput("Invalid quantity".to_string()).into());
    }

    let mut tx = pool.begin().await?;
    lock_cart(&mut tx, cart_id).await?;

    let product_size_id = sqlx::query_scalar::<_, i64>(
        "SELECT product_size_id FROM cart_items WHERE id = $1 AND cart_id = $2",
    )
    .bind(item_id)
    .bind(cart_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::not_found("Item"))?;

    let stock = sqlx::query_scalar::<_, i32>(
        "SELECT stock FROM product_sizes WHERE id = $1 FOR UPDATE",
    )
    .bind(product_size_id)
    .fetch_one(&mut *tx)
    .await?;

    let updated = match check_set_quantity(quantity, stock)? {
        QuantityChange::Remove => {
            sqlx::query("DELETE FROM cart_items WHERE id = $1")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
            None
        }
        QuantityChange::Set(q) => Some(
            sqlx::query_as::<_, CartItemRow>(
                "UPDATE cart_items SET quantity = $2 WHERE id = $1 \
                 RETURNING id, cart_id, product_id, product_size_id, quantity, added_at",
            )
            .bind(item_id)
            .bind(q)
            .fetch_one(&mut *tx)
            .await?,
        ),
    };

    touch_cart(&mut tx, cart_id).await?;
    tx.commit().await?;
    Ok(updated)
}

/// Delete one line from the cart.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] when the item is not in this cart, or
/// [`DbError::Sqlx`] on query failure.
pub async fn remove_item(pool: &PgPool, cart_id: i64, item_id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    lock_cart(&mut tx, cart_id).await?;

    let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
        .bind(item_id)
        .bind(cart_id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found("Item").into());
    }

    touch_cart(&mut tx, cart_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Delete every line in the cart. Returns the number of lines removed;
/// clearing an empty cart is a no-op.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn clear_cart(pool: &PgPool, cart_id: i64) -> Result<u64, DbError> {
    let mut tx = pool.begin().await?;
    lock_cart(&mut tx, cart_id).await?;
    let removed = clear_cart_in(&mut tx, cart_id).await?;
    touch_cart(&mut tx, cart_id).await?;
    tx.commit().await?;
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Totals over the cart's current lines.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn cart_summary(pool: &PgPool, cart_id: i64) -> Result<CartSummary, DbError> {
    let mut conn = pool.acquire().await?;
    summary_in(&mut conn, cart_id).await
}

/// Cart lines with product details, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_cart_items(pool: &PgPool, cart_id: i64) -> Result<Vec<CartItemView>, DbError> {
    let rows = sqlx::query_as::<_, CartItemView>(
        "SELECT ci.id, ci.product_id, p.name AS product_name, p.slug AS product_slug, \
                p.main_image, p.price AS unit_price, ci.product_size_id, \
                s.name AS size_name, ps.stock, ci.quantity, \
                (p.price * ci.quantity) AS line_total, ci.added_at \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         JOIN product_sizes ps ON ps.id = ci.product_size_id \
         JOIN sizes s ON s.id = ps.size_id \
         WHERE ci.cart_id = $1 \
         ORDER BY ci.added_at DESC, ci.id DESC",
    )
    .bind(cart_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Helpers shared with order placement
// ---------------------------------------------------------------------------

pub(crate) async fn lock_cart(conn: &mut PgConnection, cart_id: i64) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
        .bind(cart_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found("Cart"))?;
    Ok(())
}

pub(crate) async fn clear_cart_in(conn: &mut PgConnection, cart_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

async fn touch_cart(conn: &mut PgConnection, cart_id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn summary_in(conn: &mut PgConnection, cart_id: i64) -> Result<CartSummary, DbError> {
    let lines = sqlx::query_as::<_, (i32, Decimal)>(
        "SELECT ci.quantity, p.price \
         FROM cart_items ci \
         JOIN products p ON p.id = ci.product_id \
         WHERE ci.cart_id = $1",
    )
    .bind(cart_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(quantity, unit_price)| CartLine {
        quantity,
        unit_price,
    })
    .collect::<Vec<_>>();

    Ok(CartSummary::from_lines(&lines))
}
