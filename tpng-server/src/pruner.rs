//! Retention pruning
//!
//! For every system with pruning enabled, removes transmissions started at
//! or before `now - prune_transmissions_after_days`. Candidates are chosen
//! by one read per system, and only those IDs are deleted, so anything
//! written after selection survives the sweep. Deletes run in batches of
//! `PRUNE_BATCH_SIZE`. A system whose selection fails, or a batch whose
//! delete fails, is logged and counted while the rest of the sweep goes on;
//! the next scheduled run picks up what remains.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tpng_common::time::retention_cutoff;
use tpng_common::Result;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::systems::list_pruned_systems;
use crate::db::transmissions::{self, ExpiredTransmission};
use crate::services::BlobStore;

/// Transmissions removed per DELETE statement; keeps the bound parameters
/// well under SQLite's variable limit
pub const PRUNE_BATCH_SIZE: usize = 500;

/// Transmissions selected for deletion on one system
#[derive(Debug, Clone)]
pub struct SystemPlan {
    pub system_id: Uuid,
    pub system_name: String,
    pub cutoff: DateTime<Utc>,
    pub expired: Vec<ExpiredTransmission>,
}

/// Selection for one sweep
#[derive(Debug, Clone, Default)]
pub struct PrunePlan {
    pub systems: Vec<SystemPlan>,
    /// Systems whose candidate selection failed
    pub failed_systems: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub systems: usize,
    pub selected: usize,
    pub deleted: u64,
    pub failed_batches: usize,
    pub failed_systems: usize,
}

/// Select what one sweep would delete
pub async fn plan(pool: &SqlitePool, now: DateTime<Utc>) -> Result<PrunePlan> {
    let mut plan = PrunePlan::default();
    for system in list_pruned_systems(pool).await? {
        let cutoff = retention_cutoff(now, system.prune_transmissions_after_days);
        let expired = match transmissions::select_expired(pool, system.id, cutoff).await {
            Ok(expired) => expired,
            Err(e) => {
                plan.failed_systems += 1;
                error!(system = %system.name, "Selecting expired transmissions failed: {}", e);
                continue;
            }
        };
        plan.systems.push(SystemPlan {
            system_id: system.id,
            system_name: system.name,
            cutoff,
            expired,
        });
    }
    Ok(plan)
}

/// Delete exactly the planned transmissions
pub async fn apply(pool: &SqlitePool, blobs: &dyn BlobStore, plan: PrunePlan) -> PruneReport {
    let mut report = PruneReport {
        systems: plan.systems.len() + plan.failed_systems,
        failed_systems: plan.failed_systems,
        ..Default::default()
    };

    for system in plan.systems {
        report.selected += system.expired.len();
        let mut deleted = 0;

        for batch in system.expired.chunks(PRUNE_BATCH_SIZE) {
            match prune_batch(pool, blobs, batch).await {
                Ok(count) => deleted += count,
                Err(e) => {
                    report.failed_batches += 1;
                    error!(system = %system.system_name, count = batch.len(), "Pruning batch failed: {}", e);
                }
            }
        }

        if !system.expired.is_empty() {
            info!(
                system = %system.system_name,
                cutoff = %system.cutoff,
                deleted,
                "Pruned transmissions"
            );
        }
        report.deleted += deleted;
    }

    report
}

async fn prune_batch(pool: &SqlitePool, blobs: &dyn BlobStore, batch: &[ExpiredTransmission]) -> Result<u64> {
    for expired in batch {
        if let Err(e) = transmissions::delete_children(pool, expired.id).await {
            error!(transmission_id = %expired.id, "Deleting telemetry failed: {}", e);
        }
    }

    let ids: Vec<Uuid> = batch.iter().map(|t| t.id).collect();
    let deleted = transmissions::delete_batch(pool, &ids).await?;

    for expired in batch {
        if let Err(e) = blobs.remove(&expired.audio_file).await {
            warn!(audio_file = %expired.audio_file, "Removing pruned audio failed: {}", e);
        }
    }
    Ok(deleted)
}

/// One full sweep as of `now`
pub async fn prune_once(pool: &SqlitePool, blobs: &dyn BlobStore, now: DateTime<Utc>) -> Result<PruneReport> {
    let plan = plan(pool, now).await?;
    Ok(apply(pool, blobs, plan).await)
}

/// Sweep every `interval` until cancelled; the first sweep runs immediately
pub async fn run_scheduled(
    pool: SqlitePool,
    blobs: std::sync::Arc<dyn BlobStore>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Retention pruner stopped");
                return;
            }
            _ = ticker.tick() => {
                match prune_once(&pool, blobs.as_ref(), Utc::now()).await {
                    Ok(report) => info!(
                        systems = report.systems,
                        deleted = report.deleted,
                        failed_batches = report.failed_batches,
                        failed_systems = report.failed_systems,
                        "Retention sweep complete"
                    ),
                    Err(e) => error!("Retention sweep failed: {}", e),
                }
            }
        }
    }
}
