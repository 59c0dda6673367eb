//! System and talkgroup listings

use axum::{
    extract::{Path, State},
    Json,
};
use tpng_common::db::{System, TalkGroup};
use uuid::Uuid;

use super::auth::CurrentUser;
use crate::access::{allowed_systems, allowed_talkgroups, can_view_system, AuthContext};
use crate::db::systems::get_system;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/systems
pub async fn list_systems(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> ApiResult<Json<Vec<System>>> {
    Ok(Json(allowed_systems(&state.db, &auth).await?))
}

/// GET /api/systems/:id/talkgroups
pub async fn list_talkgroups(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(system_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TalkGroup>>> {
    let system = visible_system(&state, system_id, &auth).await?;
    Ok(Json(allowed_talkgroups(&state.db, &system, &auth).await?))
}

/// Load a system the caller may view: 404 when missing, 403 when hidden
pub(crate) async fn visible_system(state: &AppState, system_id: Uuid, auth: &AuthContext) -> ApiResult<System> {
    let system = get_system(&state.db, system_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("System {}", system_id)))?;

    if !can_view_system(&state.db, system.id, auth).await? {
        return Err(ApiError::Forbidden(format!("System {}", system_id)));
    }

    Ok(system)
}
