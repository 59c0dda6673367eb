//! Post-commit hooks
//!
//! Called explicitly once a transmission or incident write has committed.
//! Loads what the dispatcher needs, builds the jobs, and queues them on the
//! task runner without waiting for them to run.

use sqlx::SqlitePool;
use tpng_common::db::Incident;
use tracing::{debug, error};

use crate::db::{alerts, forwarders};
use crate::dispatch::{on_incident_persisted, on_transmission_persisted, TransmissionView};
use crate::runner::{SubmitOutcome, TaskRunner};

#[derive(Clone)]
pub struct Pipeline {
    db: SqlitePool,
    runner: TaskRunner,
}

impl Pipeline {
    pub fn new(db: SqlitePool, runner: TaskRunner) -> Self {
        Self { db, runner }
    }

    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// Announce a committed transmission; returns the number of jobs queued
    ///
    /// A failed lookup of alerts or forwarders is logged and the remaining
    /// jobs (at least the live broadcast) still go out.
    pub async fn transmission_committed(&self, view: &TransmissionView) -> usize {
        let transmission = &view.detail.transmission;
        let unit_ids: Vec<_> = view.units.iter().map(|u| u.id).collect();

        let alerts = alerts::alerts_for(&self.db, transmission.talkgroup_id, &unit_ids)
            .await
            .unwrap_or_else(|e| {
                error!(transmission_id = %transmission.id, "Loading alert subscriptions failed: {}", e);
                Vec::new()
            });
        let forwarders = forwarders::list_enabled(&self.db).await.unwrap_or_else(|e| {
            error!(transmission_id = %transmission.id, "Loading forwarders failed: {}", e);
            Vec::new()
        });

        let jobs = on_transmission_persisted(view, &alerts, &forwarders);
        debug!(transmission_id = %transmission.id, jobs = jobs.len(), "Dispatching transmission");
        self.submit_all(jobs).await
    }

    /// Replicate a committed incident to peers
    pub async fn incident_committed(&self, incident: &Incident, is_new: bool) -> usize {
        let forwarders = match forwarders::list_enabled(&self.db).await {
            Ok(forwarders) => forwarders,
            Err(e) => {
                error!(incident_id = %incident.id, "Loading forwarders failed: {}", e);
                return 0;
            }
        };

        let jobs = on_incident_persisted(incident, &forwarders, is_new);
        self.submit_all(jobs).await
    }

    async fn submit_all(&self, jobs: Vec<crate::dispatch::DispatchJob>) -> usize {
        let mut queued = 0;
        for job in jobs {
            if self.runner.submit(job).await == SubmitOutcome::Queued {
                queued += 1;
            }
        }
        queued
    }
}
