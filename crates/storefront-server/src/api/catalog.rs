use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use storefront_core::{CatalogParams, CatalogQuery, ProductSort};
use storefront_db::{BannerRow, CategoryRow, ProductRow, ProductSizeRow, SizeRow};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

const NEW_ARRIVALS_LIMIT: i64 = 4;
const RELATED_PRODUCTS_LIMIT: i64 = 4;

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct CategoryItem {
    id: i64,
    name: String,
    slug: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SizeItem {
    id: i64,
    name: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    id: i64,
    name: String,
    slug: String,
    category_name: String,
    category_slug: String,
    color: String,
    price: Decimal,
    main_image: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductSizeItem {
    /// Id to send as `size_id` when adding to the cart.
    id: i64,
    size_id: i64,
    name: String,
    stock: i32,
    in_stock: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct BannerItem {
    id: i64,
    title: String,
    subtitle: Option<String>,
    image: String,
    display_order: i32,
    button_text: String,
    button_link: String,
}

#[derive(Debug, Serialize)]
pub(super) struct HomeData {
    banners: Vec<BannerItem>,
    categories: Vec<CategoryItem>,
    new_arrivals: Vec<ProductItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct CatalogData {
    category: Option<CategoryItem>,
    sort: ProductSort,
    products: Vec<ProductItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductDetail {
    #[serde(flatten)]
    product: ProductItem,
    description: String,
    images: Vec<String>,
    sizes: Vec<ProductSizeItem>,
    related: Vec<ProductItem>,
}

impl From<CategoryRow> for CategoryItem {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
        }
    }
}

impl From<SizeRow> for SizeItem {
    fn from(row: SizeRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
        }
    }
}

impl From<ProductRow> for ProductItem {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            category_name: row.category_name,
            category_slug: row.category_slug,
            color: row.color,
            price: row.price,
            main_image: row.main_image,
            created_at: row.created_at,
        }
    }
}

impl From<ProductSizeRow> for ProductSizeItem {
    fn from(row: ProductSizeRow) -> Self {
        Self {
            id: row.id,
            size_id: row.size_id,
            name: row.size_name,
            stock: row.stock,
            in_stock: row.stock > 0,
        }
    }
}

impl From<BannerRow> for BannerItem {
    fn from(row: BannerRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            subtitle: row.subtitle,
            image: row.image,
            display_order: row.display_order,
            button_text: row.button_text,
            button_link: row.button_link,
        }
    }
}

fn items<R, T: From<R>>(rows: Vec<R>) -> Vec<T> {
    rows.into_iter().map(T::from).collect()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(super) async fn home(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<HomeData>>, ApiError> {
    let map_err = |e| map_db_error(req_id.0.clone(), &e);

    let banners = storefront_db::list_active_banners(&state.pool)
        .await
        .map_err(map_err)?;
    let categories = storefront_db::list_categories(&state.pool)
        .await
        .map_err(map_err)?;
    let new_arrivals = storefront_db::list_new_arrivals(&state.pool, NEW_ARRIVALS_LIMIT)
        .await
        .map_err(map_err)?;

    Ok(ApiResponse::new(
        req_id.0,
        HomeData {
            banners: items(banners),
            categories: items(categories),
            new_arrivals: items(new_arrivals),
        },
    ))
}

pub(super) async fn list_catalog(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(params): Query<CatalogParams>,
) -> Result<Json<ApiResponse<CatalogData>>, ApiError> {
    catalog_page(&state, req_id, None, &params).await
}

pub(super) async fn list_category(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(category_slug): Path<String>,
    Query(params): Query<CatalogParams>,
) -> Result<Json<ApiResponse<CatalogData>>, ApiError> {
    catalog_page(&state, req_id, Some(&category_slug), &params).await
}

async fn catalog_page(
    state: &AppState,
    req_id: RequestId,
    category_slug: Option<&str>,
    params: &CatalogParams,
) -> Result<Json<ApiResponse<CatalogData>>, ApiError> {
    let query = CatalogQuery::from_params(category_slug, params)
        .map_err(|e| ApiError::new(req_id.0.clone(), "validation_error", e.user_message()))?;

    let products = storefront_db::list_products(&state.pool, &query)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let category = match query.category_slug() {
        Some(slug) => storefront_db::get_category_by_slug(&state.pool, slug)
            .await
            .map_err(|e| map_db_error(req_id.0.clone(), &e))?
            .map(CategoryItem::from),
        None => None,
    };

    Ok(ApiResponse::new(
        req_id.0,
        CatalogData {
            category,
            sort: query.sort,
            products: items(products),
        },
    ))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let map_err = |e| map_db_error(req_id.0.clone(), &e);

    let product = storefront_db::get_product_by_slug(&state.pool, &slug)
        .await
        .map_err(map_err)?
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", "Product not found"))?;

    let images = storefront_db::list_product_images(&state.pool, product.id)
        .await
        .map_err(map_err)?;
    let sizes = storefront_db::list_product_sizes(&state.pool, product.id)
        .await
        .map_err(map_err)?;
    let related =
        storefront_db::list_related_products(&state.pool, &product, RELATED_PRODUCTS_LIMIT)
            .await
            .map_err(map_err)?;

    let description = product.description.clone();
    Ok(ApiResponse::new(
        req_id.0,
        ProductDetail {
            product: product.into(),
            description,
            images: images.into_iter().map(|img| img.image).collect(),
            sizes: items(sizes),
            related: items(related),
        },
    ))
}

pub(super) async fn list_categories(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<CategoryItem>>>, ApiError> {
    let rows = storefront_db::list_categories(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, items(rows)))
}

pub(super) async fn list_sizes(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<SizeItem>>>, ApiError> {
    let rows = storefront_db::list_sizes(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    Ok(ApiResponse::new(req_id.0, items(rows)))
}
