//! Read-side catalog queries: categories, sizes, products with their per-size
//! stock and images, and home-page banners.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use storefront_core::{CatalogQuery, ProductFilter, ProductSort, StoreError};

use crate::DbError;

const PRODUCT_COLUMNS: &str = "SELECT p.id, p.name, p.slug, p.category_id, \
        c.name AS category_name, c.slug AS category_slug, \
        p.color, p.price, p.description, p.main_image, p.created_at, p.updated_at \
     FROM products p \
     JOIN categories c ON c.id = p.category_id";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SizeRow {
    pub id: i64,
    pub name: String,
}

/// A product joined with its category name and slug.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub category_id: i64,
    pub category_name: String,
    pub category_slug: String,
    pub color: String,
    pub price: Decimal,
    pub description: String,
    pub main_image: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One purchasable size of a product. `id` is the `product_sizes` id that
/// cart and order items reference.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductSizeRow {
    pub id: i64,
    pub product_id: i64,
    pub size_id: i64,
    pub size_name: String,
    pub stock: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductImageRow {
    pub id: i64,
    pub product_id: i64,
    pub image: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BannerRow {
    pub id: i64,
    pub title: String,
    pub subtitle: Option<String>,
    pub image: String,
    pub is_active: bool,
    pub display_order: i32,
    pub button_text: String,
    pub button_link: String,
}

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// All categories ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_categories(pool: &PgPool) -> Result<Vec<CategoryRow>, DbError> {
    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT id, name, slug FROM categories ORDER BY name, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Look up a category by slug. `None` when it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_category_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<CategoryRow>, DbError> {
    let row =
        sqlx::query_as::<_, CategoryRow>("SELECT id, name, slug FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(pool)
            .await?;
    Ok(row)
}

/// All size labels in creation order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sizes(pool: &PgPool) -> Result<Vec<SizeRow>, DbError> {
    let rows = sqlx::query_as::<_, SizeRow>("SELECT id, name FROM sizes ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Active banners for the home page, by `display_order`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_banners(pool: &PgPool) -> Result<Vec<BannerRow>, DbError> {
    let rows = sqlx::query_as::<_, BannerRow>(
        "SELECT id, title, subtitle, image, is_active, display_order, button_text, button_link \
         FROM banners \
         WHERE is_active = true \
         ORDER BY display_order, id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Look up a product by slug. `None` when it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_slug(pool: &PgPool, slug: &str) -> Result<Option<ProductRow>, DbError> {
    let sql = format!("{PRODUCT_COLUMNS} WHERE p.slug = $1");
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// List products matching every filter in `query`, in the requested order.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] (wrapped in [`DbError::Store`]) when the
/// query names a category slug that does not exist, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn list_products(pool: &PgPool, query: &CatalogQuery) -> Result<Vec<ProductRow>, DbError> {
    if let Some(slug) = query.category_slug() {
        if get_category_by_slug(pool, slug).await?.is_none() {
            return Err(StoreError::not_found("Category").into());
        }
    }

    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(PRODUCT_COLUMNS);
    qb.push(" WHERE TRUE");
    for filter in &query.filters {
        push_filter(&mut qb, filter);
    }
    qb.push(order_clause(query.sort));

    let rows = qb.build_query_as::<ProductRow>().fetch_all(pool).await?;
    Ok(rows)
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    match filter {
        ProductFilter::Category(slug) => {
            qb.push(" AND c.slug = ").push_bind(slug.clone());
        }
        ProductFilter::Search(text) => {
            let pattern = like_pattern(text);
            qb.push(" AND (p.name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        ProductFilter::Color(color) => {
            qb.push(" AND LOWER(p.color) = LOWER(")
                .push_bind(color.clone())
                .push(")");
        }
        ProductFilter::MinPrice(min) => {
            qb.push(" AND p.price >= ").push_bind(*min);
        }
        ProductFilter::MaxPrice(max) => {
            qb.push(" AND p.price <= ").push_bind(*max);
        }
        ProductFilter::Size(label) => {
            qb.push(
                " AND EXISTS (SELECT 1 FROM product_sizes ps \
                   JOIN sizes s ON s.id = ps.size_id \
                   WHERE ps.product_id = p.id AND s.name = ",
            )
            .push_bind(label.clone())
            .push(")");
        }
    }
}

fn order_clause(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::PriceLow => " ORDER BY p.price ASC, p.id ASC",
        ProductSort::PriceHigh => " ORDER BY p.price DESC, p.id ASC",
        ProductSort::Newest => " ORDER BY p.created_at DESC, p.id DESC",
    }
}

/// Substring pattern for `ILIKE` with the wildcard characters in `text` escaped.
fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Newest products first, capped at `limit`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_new_arrivals(pool: &PgPool, limit: i64) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!("{PRODUCT_COLUMNS} ORDER BY p.created_at DESC, p.id DESC LIMIT $1");
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Other products from the same category as `product`, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_related_products(
    pool: &PgPool,
    product: &ProductRow,
    limit: i64,
) -> Result<Vec<ProductRow>, DbError> {
    let sql = format!(
        "{PRODUCT_COLUMNS} WHERE p.category_id = $1 AND p.id <> $2 \
         ORDER BY p.created_at DESC, p.id DESC LIMIT $3"
    );
    let rows = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(product.category_id)
        .bind(product.id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Sizes offered for a product with their current stock, by size id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_product_sizes(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<ProductSizeRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductSizeRow>(
        "SELECT ps.id, ps.product_id, ps.size_id, s.name AS size_name, ps.stock \
         FROM product_sizes ps \
         JOIN sizes s ON s.id = ps.size_id \
         WHERE ps.product_id = $1 \
         ORDER BY ps.size_id, ps.id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Extra gallery images for a product.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_product_images(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<ProductImageRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductImageRow>(
        "SELECT id, product_id, image FROM product_images WHERE product_id = $1 ORDER BY id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_wraps_and_escapes_wildcards() {
        assert_eq!(like_pattern("linen"), "%linen%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn filters_render_in_order() {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT 1 FROM products p");
        qb.push(" WHERE TRUE");
        for filter in [
            ProductFilter::Color("Red".to_string()),
            ProductFilter::MinPrice(Decimal::new(10, 0)),
            ProductFilter::Size("M".to_string()),
        ] {
            push_filter(&mut qb, &filter);
        }
        let sql = qb.sql();
        let color = sql.find("LOWER(p.color)").unwrap();
        let price = sql.find("p.price >=").unwrap();
        let size = sql.find("EXISTS").unwrap();
        assert!(color < price && price < size);
        assert!(sql.contains("$3"));
    }

    #[test]
    fn sort_clauses() {
        assert!(order_clause(ProductSort::PriceLow).contains("p.price ASC"));
        assert!(order_clause(ProductSort::PriceHigh).contains("p.price DESC"));
        assert!(order_clause(ProductSort::Newest).contains("created_at DESC"));
    }
}
