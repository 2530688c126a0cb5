use std::time::Duration;

use axum::{body::Body, http::Request, response::Response, Router};
use tower::ServiceExt;

use super::{build_app, AppState};
use crate::middleware::{AuthState, RateLimitState, SessionConfig};

pub(crate) const ADMIN_KEY: &str = "test-admin-key";

const CATALOG: &str = r"
categories:
  - name: Dresses
  - name: Shoes
sizes: [S, M, L]
products:
  - name: Linen Dress
    category: dresses
    color: White
    price: '49.90'
    description: Light summer dress
    main_image: products/linen.jpg
    images: [products/linen-back.jpg]
    sizes: { S: 5, M: 2 }
  - name: Silk Dress
    category: dresses
    color: Red
    price: '120.00'
    main_image: products/silk.jpg
    sizes: { S: 0, M: 2 }
  - name: Sold Out Sandal
    category: shoes
    color: Red
    price: '30.00'
    main_image: products/sandal.jpg
    sizes: { S: 0 }
banners:
  - title: Summer
    image: banners/summer.jpg
    display_order: 1
";

pub(crate) fn test_app(pool: sqlx::PgPool) -> Router {
    test_app_with_limits(
        pool,
        RateLimitState::new(10_000, Duration::from_secs(60)),
        RateLimitState::new(10_000, Duration::from_secs(60)),
    )
}

pub(crate) fn test_app_with_limits(
    pool: sqlx::PgPool,
    account_limit: RateLimitState,
    admin_limit: RateLimitState,
) -> Router {
    let auth = AuthState::from_keys(ADMIN_KEY, false).expect("admin auth");
    build_app(
        AppState {
            pool,
            session_ttl: chrono::Duration::hours(1),
        },
        auth,
        account_limit,
        admin_limit,
        SessionConfig {
            secure_cookies: false,
        },
    )
}

/// Seed the small fixture catalog used by the router tests.
pub(crate) async fn seed(pool: &sqlx::PgPool) {
    let catalog: storefront_core::CatalogFile =
        serde_yaml::from_str(CATALOG).expect("fixture catalog parses");
    storefront_db::seed_catalog(pool, &catalog)
        .await
        .expect("seed catalog");
}

/// `product_sizes.id` for a product slug and size label.
pub(crate) async fn product_size_id(pool: &sqlx::PgPool, product_slug: &str, size: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT ps.id FROM product_sizes ps \
         JOIN products p ON p.id = ps.product_id \
         JOIN sizes s ON s.id = ps.size_id \
         WHERE p.slug = $1 AND s.name = $2",
    )
    .bind(product_slug)
    .bind(size)
    .fetch_one(pool)
    .await
    .unwrap_or_else(|e| panic!("product size {product_slug}/{size}: {e}"))
}

pub(crate) async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.expect("router response")
}

pub(crate) async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
