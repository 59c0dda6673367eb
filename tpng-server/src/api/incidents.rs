//! Incident endpoints and the peer incident receiver

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tpng_common::db::Incident;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::systems::visible_system;
use crate::db::incidents::{self, IncidentFields, Upsert};
use crate::db::{agencies, recorders};
use crate::error::{ApiError, ApiResult, IngestError};
use crate::services::IncidentForward;
use crate::AppState;

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Reject transmissions outside `system_id` and unknown agencies
async fn validate_links(state: &AppState, system_id: Uuid, fields: &IncidentFields) -> ApiResult<()> {
    let local = incidents::retain_system_transmissions(&state.db, system_id, &fields.transmissions).await?;
    if let Some(missing) = fields.transmissions.iter().find(|id| !local.contains(id)) {
        return Err(ApiError::BadRequest(format!(
            "Transmission {} is not on system {}",
            missing, system_id
        )));
    }

    let known = agencies::retain_known(&state.db, &fields.agencies).await?;
    if let Some(missing) = fields.agencies.iter().find(|id| !known.contains(id)) {
        return Err(ApiError::BadRequest(format!("Unknown agency {}", missing)));
    }

    Ok(())
}

/// GET /api/incidents/:id
pub async fn get_incident(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Incident>> {
    let incident = incidents::get_incident(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Incident {}", id)))?;
    visible_system(&state, incident.system_id, &auth).await?;
    Ok(Json(incident))
}

/// POST /api/incidents
pub async fn create_incident(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    body: Result<Json<IncidentFields>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Incident>)> {
    let fields = json_body(body)?;
    visible_system(&state, fields.system_id, &auth).await?;
    validate_links(&state, fields.system_id, &fields).await?;

    let incident = incidents::create_incident(&state.db, tpng_common::uuid_utils::generate(), fields).await?;
    info!(incident_id = %incident.id, system_id = %incident.system_id, "Created incident");

    state.pipeline.incident_committed(&incident, true).await;
    Ok((StatusCode::CREATED, Json(incident)))
}

/// PUT /api/incidents/:id
///
/// The incident keeps its original system regardless of the body.
pub async fn update_incident(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Path(id): Path<Uuid>,
    body: Result<Json<IncidentFields>, JsonRejection>,
) -> ApiResult<Json<Incident>> {
    let fields = json_body(body)?;
    let existing = incidents::get_incident(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Incident {}", id)))?;
    visible_system(&state, existing.system_id, &auth).await?;
    validate_links(&state, existing.system_id, &fields).await?;

    let incident = incidents::update_incident(&state.db, id, fields)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Incident {}", id)))?;
    info!(incident_id = %incident.id, "Updated incident");

    state.pipeline.incident_committed(&incident, false).await;
    Ok(Json(incident))
}

#[derive(Debug, Serialize)]
pub struct ForwardReceipt {
    pub incident_id: Uuid,
    pub created: bool,
}

/// POST /api/incidents/forward
///
/// Receives an incident from a peer. The recorder key places it on the
/// recorder's system; only local transmissions and known agencies are
/// linked. An ID already used by an incident on another system is
/// rejected. Received incidents are not forwarded again.
pub async fn receive_forwarded_incident(
    State(state): State<AppState>,
    body: Result<Json<IncidentForward>, JsonRejection>,
) -> ApiResult<Json<ForwardReceipt>> {
    let Json(forward) = body.map_err(|e| IngestError::ValidationError(e.body_text()))?;

    let key = Uuid::parse_str(forward.recorder.trim()).map_err(|_| IngestError::UnknownRecorder)?;
    let recorder = recorders::find_by_key(&state.db, key)
        .await?
        .ok_or(IngestError::UnknownRecorder)?;
    if !recorder.enabled {
        return Err(IngestError::RecorderDisabled(recorder.name).into());
    }

    let remote = forward.incident;
    let transmissions =
        incidents::retain_system_transmissions(&state.db, recorder.system_id, &remote.transmissions).await?;
    let agencies = agencies::retain_known(&state.db, &remote.agencies).await?;

    let fields = IncidentFields {
        system_id: recorder.system_id,
        active: remote.active,
        time: remote.time,
        name: remote.name,
        description: remote.description,
        transmissions,
        agencies,
    };
    let (incident, created) = match incidents::upsert_incident(&state.db, remote.id, fields).await? {
        Upsert::Created(incident) => (incident, true),
        Upsert::Updated(incident) => (incident, false),
        Upsert::ForeignSystem { system_id } => {
            warn!(
                incident_id = %remote.id,
                recorder = %recorder.name,
                stored_system = %system_id,
                "Rejected forwarded incident owned by another system"
            );
            return Err(ApiError::Forbidden(format!("Incident {}", remote.id)));
        }
    };
    info!(
        incident_id = %incident.id,
        recorder = %recorder.name,
        created,
        peer_is_new = forward.is_new,
        "Received forwarded incident"
    );

    Ok(Json(ForwardReceipt {
        incident_id: incident.id,
        created,
    }))
}
