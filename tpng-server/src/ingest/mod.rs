//! Transmission ingestion
//!
//! Authorizes a recorder upload, normalizes it, and persists the
//! transmission with its telemetry in one transaction. Every rejection
//! happens before the first write. Once the write commits, the post-commit
//! hook queues the notification jobs; ingestion does not wait for them.

pub mod submission;

pub use submission::{CallMetadata, Submission};

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{can_view_talkgroup, AuthContext};
use crate::db::transmissions::{insert_transmission, NewTransmission};
use crate::db::{recorders, systems, talkgroups, users};
use crate::dispatch::TransmissionView;
use crate::error::IngestError;
use crate::pipeline::Pipeline;
use crate::services::BlobStore;

/// Returned to the recorder on success
#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub transmission_id: Uuid,
    pub jobs_queued: usize,
}

/// Everything ingestion writes to or notifies
pub struct IngestContext<'a> {
    pub db: &'a SqlitePool,
    pub blobs: &'a dyn BlobStore,
    pub pipeline: &'a Pipeline,
}

pub async fn ingest(ctx: &IngestContext<'_>, submission: Submission) -> Result<IngestReceipt, IngestError> {
    // Recorder identity
    let key = submission.recorder_key()?;
    let recorder = recorders::find_by_key(ctx.db, key)
        .await?
        .ok_or(IngestError::UnknownRecorder)?;
    if !recorder.enabled {
        return Err(IngestError::RecorderDisabled(recorder.name));
    }

    // Talkgroup, always resolved inside the recorder's system
    let metadata = submission.metadata()?;
    let talkgroup = talkgroups::find_by_decimal_id(ctx.db, recorder.system_id, metadata.talkgroup)
        .await?
        .ok_or_else(|| IngestError::UnknownTalkgroup {
            system: recorder.system_id.to_string(),
            decimal_id: metadata.talkgroup,
        })?;

    if !recorder.permits_talkgroup(talkgroup.id) {
        warn!(recorder = %recorder.name, talkgroup = talkgroup.decimal_id, "Talkgroup rejected by recorder policy");
        return Err(IngestError::TalkgroupNotPermitted(talkgroup.decimal_id));
    }

    if let Some(owner) = recorder.user_id {
        let profile = users::get_user(ctx.db, owner).await?;
        let auth = AuthContext {
            user_id: owner,
            is_site_admin: profile.map(|p| p.site_admin).unwrap_or(false),
        };
        let system = systems::get_system(ctx.db, recorder.system_id)
            .await?
            .ok_or_else(|| IngestError::PersistenceFailure("recorder system missing".to_string()))?;
        if !can_view_talkgroup(ctx.db, &system, talkgroup.id, &auth).await? {
            warn!(recorder = %recorder.name, owner = %owner, talkgroup = talkgroup.decimal_id, "Recorder owner may not view talkgroup");
            return Err(IngestError::TalkgroupNotPermitted(talkgroup.decimal_id));
        }
    }

    // Normalize everything before touching storage
    let start_time = metadata.start()?;
    let end_time = metadata.end()?;
    let units = metadata.unit_rows()?;
    let freqs = metadata.freq_rows()?;
    let audio = submission.audio_bytes()?;

    let audio_file = ctx
        .blobs
        .store(&audio, &submission.audio_extension())
        .await
        .map_err(|e| IngestError::PersistenceFailure(format!("audio store: {}", e)))?;

    let new = NewTransmission {
        system_id: recorder.system_id,
        recorder_id: recorder.id,
        talkgroup_id: talkgroup.id,
        start_time,
        end_time,
        audio_file: audio_file.clone(),
        encrypted: metadata.encrypted,
        emergency: metadata.emergency,
        frequency: metadata.freq,
        length: metadata.call_length,
        units,
        freqs,
    };

    let (detail, participants) = match insert_transmission(ctx.db, new).await {
        Ok(stored) => stored,
        Err(e) => {
            if let Err(cleanup) = ctx.blobs.remove(&audio_file).await {
                warn!(audio_file = %audio_file, "Orphaned audio blob: {}", cleanup);
            }
            return Err(IngestError::PersistenceFailure(e.to_string()));
        }
    };

    let transmission_id = detail.transmission.id;
    info!(
        transmission_id = %transmission_id,
        recorder = %recorder.name,
        talkgroup = talkgroup.decimal_id,
        units = detail.units.len(),
        emergency = detail.transmission.emergency,
        "Ingested transmission"
    );

    let view = TransmissionView {
        detail,
        talkgroup,
        units: participants,
    };
    let jobs_queued = ctx.pipeline.transmission_committed(&view).await;

    Ok(IngestReceipt {
        transmission_id,
        jobs_queued,
    })
}
