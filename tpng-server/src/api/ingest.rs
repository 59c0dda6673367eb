//! Recorder upload endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use crate::error::IngestError;
use crate::ingest::{ingest, IngestContext, IngestReceipt, Submission};
use crate::AppState;

/// POST /api/transmissions/ingest
///
/// Authenticated by the recorder key in the body, not by user identity.
pub async fn ingest_transmission(
    State(state): State<AppState>,
    body: Result<Json<Submission>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestReceipt>), IngestError> {
    let Json(submission) = body.map_err(|e| IngestError::ValidationError(e.body_text()))?;

    let ctx = IngestContext {
        db: &state.db,
        blobs: state.blobs.as_ref(),
        pipeline: &state.pipeline,
    };
    let receipt = ingest(&ctx, submission).await?;

    Ok((StatusCode::CREATED, Json(receipt)))
}
