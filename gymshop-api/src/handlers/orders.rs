use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use gymshop_core::services::NewOrderItem;
use gymshop_core::{OrderStatus, ShopError};

use crate::extract::{AdminUser, AuthUser};
use crate::handlers::PageQuery;
use crate::observability;
use crate::response::{ApiError, ApiResponse, Pagination};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub address_id: Uuid,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub variant_id: Uuid,
    pub quantity: u32,
}

/// Status arrives as a plain string so unknown values surface as
/// InvalidInput from the service rather than a serde rejection.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let items: Vec<NewOrderItem> = req
        .items
        .iter()
        .map(|i| NewOrderItem {
            variant_id: i.variant_id,
            quantity: i.quantity,
        })
        .collect();

    let view = match state
        .orders
        .create_order(&principal, req.address_id, &items)
        .await
    {
        Ok(view) => {
            observability::record_order_placed();
            view
        }
        Err(err) => {
            if matches!(err, ShopError::InsufficientStock { .. }) {
                observability::record_stock_rejection();
            }
            return Err(err.into());
        }
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.orders.get_order(&principal, order_id).await?;
    Ok(Json(ApiResponse::ok(view)))
}

pub async fn list_for_user(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (views, total) = state
        .orders
        .list_orders_for_user(&principal, user_id, page.limit, page.offset)
        .await?;
    Ok(Json(ApiResponse::page(
        views,
        Pagination {
            total,
            limit: page.limit,
            offset: page.offset.unwrap_or(0),
        },
    )))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.orders.update_status(order_id, &req.status).await?;
    if view.order.status == OrderStatus::Cancelled {
        observability::record_order_cancelled();
    }
    Ok(Json(ApiResponse::ok(view)))
}
