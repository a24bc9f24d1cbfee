use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use gymshop_core::services::variant::VariantInput;

use crate::extract::AdminUser;
use crate::response::{ApiError, ApiResponse};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariantRequest {
    pub product_id: Uuid,
    pub name: String,
    pub price: f64,
    pub stock: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVariantRequest {
    pub name: String,
    pub price: f64,
    pub stock: u32,
}

pub async fn list_for_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let variants = state.variants.list_for_product(product_id).await?;
    Ok(Json(ApiResponse::ok(variants)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let variant = state.variants.get_variant(variant_id).await?;
    Ok(Json(ApiResponse::ok(variant)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Json(req): Json<CreateVariantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let variant = state
        .variants
        .create_variant(
            req.product_id,
            VariantInput {
                name: req.name,
                price: req.price,
                stock: req.stock,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(variant))))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(variant_id): Path<Uuid>,
    Json(req): Json<UpdateVariantRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let variant = state
        .variants
        .update_variant(
            variant_id,
            VariantInput {
                name: req.name,
                price: req.price,
                stock: req.stock,
            },
        )
        .await?;
    Ok(Json(ApiResponse::ok(variant)))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(variant_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.variants.delete_variant(variant_id).await?;
    Ok(Json(ApiResponse::ok_with_message((), "variant deleted")))
}
