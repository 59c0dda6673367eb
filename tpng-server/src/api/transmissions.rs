//! Transmission read and delete endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tpng_common::db::Transmission;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::CurrentUser;
use crate::access::{can_view_transmission, visible_talkgroup_ids};
use crate::db::transmissions::{self, TransmissionDetail};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// GET /api/transmissions
///
/// Most recent transmissions on talkgroups the caller may view.
pub async fn list_transmissions(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Transmission>>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let talkgroups = visible_talkgroup_ids(&state.db, &auth).await?;
    let list = transmissions::list_for_talkgroups(&state.db, &talkgroups, limit).await?;
    Ok(Json(list))
}

/// GET /api/transmissions/:id
pub async fn get_transmission(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TransmissionDetail>> {
    let detail = transmissions::get_transmission_detail(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transmission {}", id)))?;

    if !can_view_transmission(&state.db, &detail.transmission, &auth).await? {
        return Err(ApiError::Forbidden(format!("Transmission {}", id)));
    }

    Ok(Json(detail))
}

/// DELETE /api/transmissions/:id
///
/// Site admins only. Removes the transmission, its telemetry, and its audio.
pub async fn delete_transmission(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if !auth.is_site_admin {
        return Err(ApiError::Forbidden("Site admin required".to_string()));
    }

    let audio_file = transmissions::delete_transmission(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transmission {}", id)))?;

    if let Err(e) = state.blobs.remove(&audio_file).await {
        warn!(audio_file = %audio_file, "Removing deleted transmission audio failed: {}", e);
    }
    info!(transmission_id = %id, user_id = %auth.user_id, "Deleted transmission");

    Ok(StatusCode::NO_CONTENT)
}
