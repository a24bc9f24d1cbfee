//! JSON response envelope and error mapping.
//!
//! Success: `{ "success": true, "data": ..., "message"?, "pagination"? }`.
//! Error: `{ "success": false, "message": ..., "error"? }` where `error`
//! carries debug detail outside production.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::Lazy;
use serde::Serialize;

use gymshop_core::ShopError;

static EXPOSE_ERROR_DETAIL: Lazy<bool> = Lazy::new(|| {
    std::env::var("GYMSHOP_ENV")
        .map(|v| v != "production")
        .unwrap_or(true)
});

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            pagination: None,
        }
    }

    pub fn page(data: T, pagination: Pagination) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: Some(pagination),
        }
    }
}

/// Wrapper turning a `ShopError` into the error envelope with the right
/// HTTP status. Handlers return `Result<_, ApiError>` and use `?`.
#[derive(Debug)]
pub struct ApiError(pub ShopError);

impl From<ShopError> for ApiError {
    fn from(err: ShopError) -> Self {
        ApiError(err)
    }
}

fn status_for(err: &ShopError) -> StatusCode {
    match err {
        ShopError::NotFound(_) => StatusCode::NOT_FOUND,
        ShopError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ShopError::InvalidRelation(_) | ShopError::Forbidden(_) => StatusCode::FORBIDDEN,
        ShopError::InsufficientStock { .. } | ShopError::Conflict(_) => StatusCode::CONFLICT,
        ShopError::Unauthorized(_) | ShopError::Auth(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let mut body = serde_json::json!({
            "success": false,
            "message": self.0.to_string(),
        });
        if *EXPOSE_ERROR_DETAIL {
            body["error"] = serde_json::Value::String(format!("{:?}", self.0));
        }
        (status, Json(body)).into_response()
    }
}
