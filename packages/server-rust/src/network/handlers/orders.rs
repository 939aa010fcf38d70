//! Order placement and polling.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use canteen_core::{LineItem, OrderId};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::network::error::ApiError;
use crate::network::interceptor::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<LineItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusParams {
    pub order_id: OrderId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: OrderId,
    pub code: i64,
    pub status: &'static str,
}

/// `POST /orders`: accepts the order for asynchronous processing.
pub async fn place_order_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(body): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlaceOrderResponse>), ApiError> {
    let order_id = state.orders.place_order(&user_id, &body.items).await?;
    Ok((StatusCode::ACCEPTED, Json(PlaceOrderResponse { order_id })))
}

/// `GET /orders/status?orderId=`: ownership is checked by the
/// authorization chain before this runs.
pub async fn order_status_handler(
    State(state): State<AppState>,
    Query(params): Query<OrderStatusParams>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let code = state.orders.status(&params.order_id).await?;
    Ok(Json(OrderStatusResponse {
        order_id: params.order_id,
        code: code.0,
        status: code.label(),
    }))
}
