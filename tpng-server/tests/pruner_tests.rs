//! Retention pruner tests
//!
//! Tests cover:
//! - Only opted-in systems are pruned, by their own retention window
//! - Telemetry of surviving transmissions is untouched
//! - The cutoff is fixed when the sweep selects its rows
//! - Incidents outlive the transmissions they reference
//! - Backlogs larger than one DELETE statement are removed in batches
//! - A system whose selection fails does not stop the others
//! - The scheduled pruner stops on cancellation

mod helpers;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use helpers::*;
use tpng_common::db::init_memory_database;
use tpng_common::time::to_millis;
use tpng_server::db::acls::create_system_acl;
use tpng_server::db::incidents::{create_incident, get_incident, IncidentFields};
use tpng_server::db::recorders::{create_recorder, NewRecorder};
use tpng_server::db::systems::{create_system, NewSystem};
use tpng_server::db::talkgroups::{create_talkgroup, NewTalkGroup};
use tpng_server::db::transmissions::{
    count_children, get_transmission, insert_transmission, NewTransmission, NewTransmissionFreq,
    NewTransmissionUnit,
};
use tpng_server::pruner::{self, PRUNE_BATCH_SIZE};
use tpng_server::services::{BlobStore, FsBlobStore};

struct Site {
    system_id: Uuid,
    recorder_id: Uuid,
    talkgroup_id: Uuid,
}

async fn site(pool: &SqlitePool, name: &str, prune: bool, days: i64) -> Site {
    let acl = create_system_acl(pool, name, true, &[]).await.unwrap();
    let mut system = NewSystem::new(name, acl.id);
    system.prune_transmissions = prune;
    system.prune_transmissions_after_days = days;
    let system = create_system(pool, system).await.unwrap();
    let talkgroup = create_talkgroup(pool, NewTalkGroup::new(system.id, 100, "Dispatch"))
        .await
        .unwrap();
    let recorder = create_recorder(pool, NewRecorder::new(system.id, name))
        .await
        .unwrap();
    Site {
        system_id: system.id,
        recorder_id: recorder.id,
        talkgroup_id: talkgroup.id,
    }
}

async fn record(pool: &SqlitePool, blobs: &dyn BlobStore, site: &Site, start: DateTime<Utc>) -> Uuid {
    let audio_file = blobs.store(AUDIO_BYTES, "m4a").await.unwrap();
    let (detail, _) = insert_transmission(
        pool,
        NewTransmission {
            system_id: site.system_id,
            recorder_id: site.recorder_id,
            talkgroup_id: site.talkgroup_id,
            start_time: start,
            end_time: Some(start + ChronoDuration::seconds(3)),
            audio_file,
            encrypted: false,
            emergency: false,
            frequency: 851_012_500.0,
            length: 3.0,
            units: vec![NewTransmissionUnit {
                time: start,
                unit_decimal_id: 1001,
                pos: 0,
                emergency: false,
                signal_system: String::new(),
                tag: String::new(),
                length: 3.0,
            }],
            freqs: vec![NewTransmissionFreq {
                time: start,
                freq: 851_012_500,
                pos: 0,
                len: 3,
                error_count: 0,
                spike_count: 0,
            }],
        },
    )
    .await
    .unwrap();
    detail.transmission.id
}

/// Bulk-insert `count` bare transmissions on `site` starting at `start`
async fn backlog(pool: &SqlitePool, site: &Site, start: DateTime<Utc>, count: i64) {
    sqlx::query(
        r#"
        WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?)
        INSERT INTO transmissions (guid, system_id, recorder_id, talkgroup_id, start_time, audio_file)
        SELECT printf('00000000-0000-4000-8000-%012d', n), ?, ?, ?, ? + n, printf('backlog-%d.m4a', n)
        FROM seq
        "#,
    )
    .bind(count)
    .bind(site.system_id.to_string())
    .bind(site.recorder_id.to_string())
    .bind(site.talkgroup_id.to_string())
    .bind(to_millis(start))
    .execute(pool)
    .await
    .unwrap();
}

async fn exists(pool: &SqlitePool, id: Uuid) -> bool {
    get_transmission(pool, id).await.unwrap().is_some()
}

#[tokio::test]
async fn test_prunes_only_expired_on_opted_in_systems() {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::new(dir.path().to_path_buf());
    let now = Utc::now();

    let pruned = site(&pool, "pruned", true, 30).await;
    let kept = site(&pool, "kept", false, 30).await;

    let old = record(&pool, &blobs, &pruned, now - ChronoDuration::days(60)).await;
    let fresh = record(&pool, &blobs, &pruned, now - ChronoDuration::days(1)).await;
    let old_but_kept = record(&pool, &blobs, &kept, now - ChronoDuration::days(60)).await;

    let report = pruner::prune_once(&pool, &blobs, now).await.unwrap();
    assert_eq!(report.systems, 1);
    assert_eq!(report.selected, 1);
    assert_eq!(report.deleted, 1);
    assert_eq!(report.failed_batches, 0);

    assert!(!exists(&pool, old).await);
    assert!(exists(&pool, fresh).await);
    assert!(exists(&pool, old_but_kept).await);

    assert_eq!(count_children(&pool, old).await.unwrap(), (0, 0));
    assert_eq!(count_children(&pool, fresh).await.unwrap(), (1, 1));
    assert_eq!(count_children(&pool, old_but_kept).await.unwrap(), (1, 1));
    assert_eq!(count_rows(&pool, "units").await, 2, "units are not pruned");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
}

#[tokio::test]
async fn test_retention_window_is_per_system() {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::new(dir.path().to_path_buf());
    let now = Utc::now();

    let short = site(&pool, "short", true, 7).await;
    let long = site(&pool, "long", true, 90).await;

    let ten_days = now - ChronoDuration::days(10);
    let on_short = record(&pool, &blobs, &short, ten_days).await;
    let on_long = record(&pool, &blobs, &long, ten_days).await;

    let report = pruner::prune_once(&pool, &blobs, now).await.unwrap();
    assert_eq!(report.systems, 2);
    assert_eq!(report.deleted, 1);
    assert!(!exists(&pool, on_short).await);
    assert!(exists(&pool, on_long).await);
}

#[tokio::test]
async fn test_cutoff_fixed_at_selection() {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::new(dir.path().to_path_buf());
    let now = Utc::now();
    let pruned = site(&pool, "pruned", true, 30).await;

    let selected = record(&pool, &blobs, &pruned, now - ChronoDuration::days(45)).await;
    let plan = pruner::plan(&pool, now).await.unwrap();
    assert_eq!(plan.systems[0].expired.len(), 1);

    let late_arrival = record(&pool, &blobs, &pruned, now - ChronoDuration::days(45)).await;
    let report = pruner::apply(&pool, &blobs, plan).await;

    assert_eq!(report.deleted, 1);
    assert!(!exists(&pool, selected).await);
    assert!(exists(&pool, late_arrival).await, "rows written after selection wait for the next sweep");
    assert_eq!(count_children(&pool, late_arrival).await.unwrap(), (1, 1));
}

#[tokio::test]
async fn test_incidents_outlive_pruned_transmissions() {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::new(dir.path().to_path_buf());
    let now = Utc::now();
    let pruned = site(&pool, "pruned", true, 30).await;

    let old = record(&pool, &blobs, &pruned, now - ChronoDuration::days(60)).await;
    let fresh = record(&pool, &blobs, &pruned, now - ChronoDuration::days(2)).await;

    let incident_id = Uuid::new_v4();
    create_incident(
        &pool,
        incident_id,
        IncidentFields {
            system_id: pruned.system_id,
            active: true,
            time: now - ChronoDuration::days(60),
            name: "Brush fire".to_string(),
            description: None,
            transmissions: vec![old, fresh],
            agencies: Vec::new(),
        },
    )
    .await
    .unwrap();

    pruner::prune_once(&pool, &blobs, now).await.unwrap();

    let incident = get_incident(&pool, incident_id).await.unwrap().unwrap();
    assert_eq!(incident.name, "Brush fire");
    assert_eq!(incident.transmissions, vec![fresh]);
}

#[tokio::test]
async fn test_scheduled_pruner_sweeps_then_stops() {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(dir.path().to_path_buf()));
    let pruned = site(&pool, "pruned", true, 30).await;
    let old = record(&pool, blobs.as_ref(), &pruned, Utc::now() - ChronoDuration::days(60)).await;

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(pruner::run_scheduled(
        pool.clone(),
        blobs.clone(),
        Duration::from_secs(3600),
        shutdown.clone(),
    ));

    let mut swept = false;
    for _ in 0..50 {
        if !exists(&pool, old).await {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(swept, "first sweep runs immediately");

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("pruner did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_large_backlog_pruned_in_batches() {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::new(dir.path().to_path_buf());
    let now = Utc::now();
    let pruned = site(&pool, "pruned", true, 30).await;

    // More rows than SQLite accepts as bound variables in one statement
    let total = 40_000;
    assert!(total as usize > 32_766 && total as usize > PRUNE_BATCH_SIZE);
    backlog(&pool, &pruned, now - ChronoDuration::days(60), total).await;
    let fresh = record(&pool, &blobs, &pruned, now - ChronoDuration::days(1)).await;

    let report = pruner::prune_once(&pool, &blobs, now).await.unwrap();
    assert_eq!(report.selected, total as usize);
    assert_eq!(report.deleted, total as u64);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(count_rows(&pool, "transmissions").await, 1);
    assert!(exists(&pool, fresh).await);
    assert_eq!(count_children(&pool, fresh).await.unwrap(), (1, 1));
}

#[tokio::test]
async fn test_failed_selection_does_not_stop_other_systems() {
    let pool = init_memory_database().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::new(dir.path().to_path_buf());
    let now = Utc::now();

    let broken = site(&pool, "broken", true, 30).await;
    let healthy = site(&pool, "healthy", true, 30).await;

    // A row whose ID cannot be read back makes selection fail for its system
    sqlx::query(
        "INSERT INTO transmissions (guid, system_id, recorder_id, talkgroup_id, start_time, audio_file) \
         VALUES ('not-a-uuid', ?, ?, ?, ?, 'broken.m4a')",
    )
    .bind(broken.system_id.to_string())
    .bind(broken.recorder_id.to_string())
    .bind(broken.talkgroup_id.to_string())
    .bind(to_millis(now - ChronoDuration::days(60)))
    .execute(&pool)
    .await
    .unwrap();
    let old = record(&pool, &blobs, &healthy, now - ChronoDuration::days(60)).await;

    let report = pruner::prune_once(&pool, &blobs, now).await.unwrap();
    assert_eq!(report.systems, 2);
    assert_eq!(report.failed_systems, 1);
    assert_eq!(report.deleted, 1);
    assert!(!exists(&pool, old).await);
    assert_eq!(count_rows(&pool, "transmissions").await, 1, "broken row waits for a later sweep");
}
