//! Caller identity for read-path endpoints
//!
//! Sessions and tokens are handled by the authentication layer in front of
//! this service, which forwards the authenticated user as `X-User-Id`. The
//! site-admin flag always comes from the stored profile, never the request.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::access::AuthContext;
use crate::db::users;
use crate::error::ApiError;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Extracts the caller's [`AuthContext`]
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub AuthContext);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing X-User-Id header".to_string()))?;

        let user_id = header
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value.trim()).ok())
            .ok_or_else(|| ApiError::Unauthorized("Malformed X-User-Id header".to_string()))?;

        let profile = users::get_user(&state.db, user_id)
            .await?
            .ok_or_else(|| ApiError::Unauthorized(format!("Unknown user {}", user_id)))?;

        Ok(CurrentUser(AuthContext {
            user_id,
            is_site_admin: profile.site_admin,
        }))
    }
}
