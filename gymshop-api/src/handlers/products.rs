use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use gymshop_core::services::product::ProductInput;

use crate::extract::AdminUser;
use crate::handlers::PageQuery;
use crate::response::{ApiError, ApiResponse, Pagination};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

impl From<ProductRequest> for ProductInput {
    fn from(req: ProductRequest) -> Self {
        ProductInput {
            name: req.name,
            description: req.description,
            category: req.category,
            image_url: req.image_url,
        }
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (products, total) = state
        .products
        .list_products(page.limit, page.offset)
        .await?;
    Ok(Json(ApiResponse::page(
        products,
        Pagination {
            total,
            limit: page.limit,
            offset: page.offset.unwrap_or(0),
        },
    )))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.products.get_product(product_id).await?;
    Ok(Json(ApiResponse::ok(view)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Json(req): Json<ProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.products.create_product(req.into()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(product))))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(product_id): Path<Uuid>,
    Json(req): Json<ProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state.products.update_product(product_id, req.into()).await?;
    Ok(Json(ApiResponse::ok(product)))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.products.delete_product(product_id).await?;
    Ok(Json(ApiResponse::ok_with_message((), "product deleted")))
}
