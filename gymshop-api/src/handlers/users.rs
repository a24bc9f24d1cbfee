use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;

use crate::extract::{AdminUser, AuthUser};
use crate::handlers::PageQuery;
use crate::response::{ApiError, ApiResponse, Pagination};
use crate::state::AppState;

pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.users.get_profile(&principal).await?;
    Ok(Json(ApiResponse::ok(user)))
}

/// Self-service account deletion. A failed credential revocation is
/// reported as a partial success because the local data is already gone.
pub async fn delete_me(
    State(state): State<Arc<AppState>>,
    AuthUser(principal): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.users.delete_account(&principal).await?;
    let message = if outcome.credentials_revoked {
        "account deleted"
    } else {
        "account data deleted, but credential revocation failed"
    };
    Ok(Json(ApiResponse::ok_with_message(outcome, message)))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (users, total) = state.users.list_users(page.limit, page.offset).await?;
    Ok(Json(ApiResponse::page(
        users,
        Pagination {
            total,
            limit: page.limit,
            offset: page.offset.unwrap_or(0),
        },
    )))
}
