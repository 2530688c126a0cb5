use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use storefront_core::{AppConfig, ConfigError, StoreError};
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Postgres error code for `unique_violation`.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

// Path relative to crates/storefront-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    /// A domain rule rejected the operation; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Catalog(#[from] ConfigError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// The domain error, if this failure came from a business rule.
    #[must_use]
    pub fn as_store(&self) -> Option<&StoreError> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // _sqlx_migrations does not exist on a fresh database; count that as zero.
    let applied_before = applied_migration_count(pool).await;
    MIGRATOR.run(pool).await?;
    let applied_after = applied_migration_count(pool).await;

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

async fn applied_migration_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[test]
    fn store_errors_are_exposed() {
        let err = DbError::from(StoreError::NoSizesAvailable);
        assert_eq!(err.as_store(), Some(&StoreError::NoSizesAvailable));
        assert!(DbError::from(sqlx::Error::RowNotFound).as_store().is_none());
    }
}

pub mod carts;
pub mod catalog;
pub mod orders;
pub mod seed;
pub mod users;

pub use carts::{
    add_item, cart_summary, clear_cart, get_or_create_cart, list_cart_items, remove_item,
    update_item_quantity, AddedItem, CartItemRow, CartItemView, CartRow,
};
pub use catalog::{
    get_category_by_slug, get_product_by_slug, list_active_banners, list_categories,
    list_new_arrivals, list_product_images, list_product_sizes, list_products,
    list_related_products, list_sizes, BannerRow, CategoryRow, ProductImageRow, ProductRow,
    ProductSizeRow, SizeRow,
};
pub use orders::{
    get_order, get_order_for_user, list_order_items, list_orders_for_user, place_order_from_cart,
    update_order_status, OrderItemRow, OrderRow, ShippingDetails, StatusChange,
};
pub use seed::{seed_catalog, SeedReport};
pub use users::{
    create_user, create_user_session, delete_user_session, find_session_user, get_user,
    get_user_credentials_by_email, purge_expired_sessions, update_user_profile, NewUser,
    ProfileUpdate, UserCredentialsRow, UserRow,
};
