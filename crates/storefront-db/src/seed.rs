use std::collections::HashMap;

use sqlx::PgPool;
use storefront_core::{CatalogFile, ConfigError};

use crate::DbError;

/// Row counts written by [`seed_catalog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub categories: usize,
    pub sizes: usize,
    pub products: usize,
    pub banners: usize,
}

/// Upsert a catalog seed file into the database.
///
/// Categories and products are keyed by slug, sizes by label, banners by
/// title. Stock for each listed product size is overwritten with the file's
/// value. All upserts run inside a single transaction; if any operation
/// fails the entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_catalog(pool: &PgPool, catalog: &CatalogFile) -> Result<SeedReport, DbError> {
    let mut tx = pool.begin().await?;
    let mut report = SeedReport::default();

    let mut category_ids: HashMap<String, i64> = HashMap::new();
    for category in &catalog.categories {
        let slug = category.slug();
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO categories (name, slug) VALUES ($1, $2) \
             ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id",
        )
        .bind(category.name.trim())
        .bind(&slug)
        .fetch_one(&mut *tx)
        .await?;
        category_ids.insert(slug, id);
        report.categories += 1;
    }

    let mut size_ids: HashMap<&str, i64> = HashMap::new();
    for size in &catalog.sizes {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO sizes (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id",
        )
        .bind(size)
        .fetch_one(&mut *tx)
        .await?;
        size_ids.insert(size.as_str(), id);
        report.sizes += 1;
    }

    for product in &catalog.products {
        let slug = product.slug();
        let category_id = *category_ids.get(&product.category).ok_or_else(|| {
            unknown_reference(format!("product '{slug}' category '{}'", product.category))
        })?;

        let product_id: i64 = sqlx::query_scalar(
            "INSERT INTO products (name, slug, category_id, color, price, description, main_image) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name        = EXCLUDED.name, \
                 category_id = EXCLUDED.category_id, \
                 color       = EXCLUDED.color, \
                 price       = EXCLUDED.price, \
                 description = EXCLUDED.description, \
                 main_image  = EXCLUDED.main_image, \
                 updated_at  = NOW() \
             RETURNING id",
        )
        .bind(product.name.trim())
        .bind(&slug)
        .bind(category_id)
        .bind(&product.color)
        .bind(product.price)
        .bind(&product.description)
        .bind(&product.main_image)
        .fetch_one(&mut *tx)
        .await?;

        let mut stocked = Vec::with_capacity(product.sizes.len());
        for (size, stock) in &product.sizes {
            let size_id = *size_ids
                .get(size.as_str())
                .ok_or_else(|| unknown_reference(format!("product '{slug}' size '{size}'")))?;
            stocked.push((size_id, *stock));
        }
        // Rows are created in size order so new product_sizes ids follow the size list.
        stocked.sort_unstable_by_key(|(size_id, _)| *size_id);

        for (size_id, stock) in stocked {
            sqlx::query(
                "INSERT INTO product_sizes (product_id, size_id, stock) VALUES ($1, $2, $3) \
                 ON CONFLICT (product_id, size_id) DO UPDATE SET stock = EXCLUDED.stock",
            )
            .bind(product_id)
            .bind(size_id)
            .bind(stock)
            .execute(&mut *tx)
            .await?;
        }

        for image in &product.images {
            sqlx::query(
                "INSERT INTO product_images (product_id, image) VALUES ($1, $2) \
                 ON CONFLICT (product_id, image) DO NOTHING",
            )
            .bind(product_id)
            .bind(image)
            .execute(&mut *tx)
            .await?;
        }

        report.products += 1;
    }

    for banner in &catalog.banners {
        sqlx::query(
            "INSERT INTO banners \
                 (title, subtitle, image, is_active, display_order, button_text, button_link) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (title) DO UPDATE SET \
                 subtitle      = EXCLUDED.subtitle, \
                 image         = EXCLUDED.image, \
                 is_active     = EXCLUDED.is_active, \
                 display_order = EXCLUDED.display_order, \
                 button_text   = EXCLUDED.button_text, \
                 button_link   = EXCLUDED.button_link",
        )
        .bind(&banner.title)
        .bind(&banner.subtitle)
        .bind(&banner.image)
        .bind(banner.is_active)
        .bind(banner.display_order)
        .bind(&banner.button_text)
        .bind(&banner.button_link)
        .execute(&mut *tx)
        .await?;
        report.banners += 1;
    }

    tx.commit().await?;
    tracing::info!(
        categories = report.categories,
        sizes = report.sizes,
        products = report.products,
        banners = report.banners,
        "catalog seeded"
    );
    Ok(report)
}

/// Error for a seed row that references an undeclared category or size.
fn unknown_reference(what: String) -> DbError {
    DbError::Catalog(ConfigError::CatalogValidation(format!(
        "{what} is not declared in the catalog file"
    )))
}
