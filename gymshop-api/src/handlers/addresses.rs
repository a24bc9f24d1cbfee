use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use gymshop_core::services::address::AddressInput;

use crate::extract::AuthUser;
use crate::response::{ApiError, ApiResponse};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRequest {
    pub recipient: String,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl From<AddressRequest> for AddressInput {
    fn from(req: AddressRequest) -> Self {
        AddressInput {
            recipient: req.recipient,
            street: req.street,
            city: req.city,
            postal_code: req.postal_code,
            country: req.country,
        }
    }
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let addresses = state.addresses.list_addresses(&principal).await?;
    Ok(Json(ApiResponse::ok(addresses)))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
    Json(req): Json<AddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state.addresses.create_address(&principal, req.into()).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(address))))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
    Path(address_id): Path<Uuid>,
    Json(req): Json<AddressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let address = state
        .addresses
        .update_address(&principal, address_id, req.into())
        .await?;
    Ok(Json(ApiResponse::ok(address)))
}

pub async fn remove(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
    Path(address_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.addresses.delete_address(&principal, address_id).await?;
    Ok(Json(ApiResponse::ok_with_message((), "address deleted")))
}
