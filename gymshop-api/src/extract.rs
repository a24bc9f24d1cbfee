//! Request extractors resolving the bearer token into a request-scoped
//! principal, exactly once per request.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use gymshop_core::auth::Principal;
use gymshop_core::ShopError;

use crate::response::ApiError;
use crate::state::AppState;

/// Any authenticated user.
pub struct AuthUser(pub Principal);

/// Admin-only gate for privileged routes.
pub struct AdminUser(pub Principal);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError(ShopError::Unauthorized(
                "missing authorization header".to_string(),
            ))
        })?;
    header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError(ShopError::Unauthorized(
            "authorization header is not a bearer token".to_string(),
        ))
    })
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let principal = state.tokens.verify(token).map_err(ApiError)?;
        Ok(AuthUser(principal))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(principal) = AuthUser::from_request_parts(parts, state).await?;
        if !principal.is_admin() {
            return Err(ApiError(ShopError::Forbidden(
                "admin role required".to_string(),
            )));
        }
        Ok(AdminUser(principal))
    }
}
