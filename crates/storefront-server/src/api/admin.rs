use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use storefront_core::{OrderStatus, StockDelta};

use crate::middleware::RequestId;

use super::{account::OrderSummary, map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct StatusRequest {
    status: String,
}

#[derive(Debug, Serialize)]
pub(super) struct StatusChangeData {
    order: OrderSummary,
    previous_status: OrderStatus,
    stock_deltas: Vec<StockDelta>,
}

/// Move an order to a new status, applying the stock debit or credit the
/// transition implies.
pub(super) async fn update_order_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(order_id): Path<i64>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<ApiResponse<StatusChangeData>>, ApiError> {
    let status: OrderStatus = body
        .status
        .trim()
        .parse()
        .map_err(|e: storefront_core::StoreError| {
            ApiError::new(req_id.0.clone(), "validation_error", e.user_message())
        })?;

    let change = storefront_db::update_order_status(&state.pool, order_id, status)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = StatusChangeData {
        order: OrderSummary::from_row(&req_id.0, change.order)?,
        previous_status: change.previous,
        stock_deltas: change.deltas,
    };
    Ok(ApiResponse::new(req_id.0, data))
}
