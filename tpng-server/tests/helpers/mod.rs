//! Shared fixtures for tpng-server integration tests
//!
//! Each [`TestEnv`] owns an in-memory database seeded with one
//! ACL-restricted system, a filesystem blob store in a temp dir, and a
//! running task runner whose gateway and forwarder only record calls.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use tpng_common::config::QueueFullPolicy;
use tpng_common::db::{init_memory_database, SystemRecorder, TalkGroup};
use tpng_server::db::acls::{create_system_acl, create_talkgroup_acl, NewTalkGroupAcl};
use tpng_server::db::recorders::{create_recorder, NewRecorder};
use tpng_server::db::systems::{create_system, NewSystem};
use tpng_server::db::talkgroups::{create_talkgroup, NewTalkGroup};
use tpng_server::db::users::create_user;
use tpng_server::error::{DispatchError, IngestError};
use tpng_server::executor::DispatchExecutor;
use tpng_server::ingest::{ingest, IngestContext, IngestReceipt, Submission};
use tpng_server::live::LiveBroadcaster;
use tpng_server::pipeline::Pipeline;
use tpng_server::runner::{RunnerConfig, RunnerHandle, TaskRunner};
use tpng_server::services::{BlobStore, ForwardRequest, FsBlobStore, NotificationGateway, RemoteForwarder};
use tpng_server::{build_router, AppState};

/// Call start used by [`submission`], in unix seconds
pub const CALL_START: f64 = 1_700_000_000.0;

pub const AUDIO_BYTES: &[u8] = b"fake-m4a-audio";

/// One gateway call
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub urls: Vec<String>,
    pub title: String,
    pub body: String,
}

/// Records notifications; fails every call once `fail` is set
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<SentNotification>>,
    pub fail: AtomicBool,
}

impl RecordingGateway {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn notify(&self, urls: &[String], title: &str, body: &str) -> Result<(), DispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Gateway("gateway unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(SentNotification {
            urls: urls.to_vec(),
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Records peer requests without sending them
#[derive(Default)]
pub struct RecordingForwarder {
    pub requests: Mutex<Vec<(String, ForwardRequest)>>,
}

impl RecordingForwarder {
    pub fn requests(&self) -> Vec<(String, ForwardRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteForwarder for RecordingForwarder {
    async fn forward(&self, base_url: &str, request: ForwardRequest) -> Result<(), DispatchError> {
        self.requests
            .lock()
            .unwrap()
            .push((base_url.to_string(), request));
        Ok(())
    }
}

/// Seeded rows
///
/// `member` may view the system and `fire` (decimal 100) but not
/// `police` (decimal 200); `outsider` cannot view the system at all.
#[derive(Debug, Clone)]
pub struct Seed {
    pub admin: Uuid,
    pub member: Uuid,
    pub outsider: Uuid,
    pub system_id: Uuid,
    pub fire: TalkGroup,
    pub police: TalkGroup,
    pub recorder: SystemRecorder,
}

pub async fn seed(pool: &SqlitePool) -> Seed {
    let admin = Uuid::new_v4();
    let member = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    create_user(pool, admin, true).await.unwrap();
    create_user(pool, member, false).await.unwrap();
    create_user(pool, outsider, false).await.unwrap();

    let acl = create_system_acl(pool, "county-staff", false, &[member])
        .await
        .unwrap();
    let mut system = NewSystem::new("County P25", acl.id);
    system.enable_talkgroup_acls = true;
    let system = create_system(pool, system).await.unwrap();

    let fire = create_talkgroup(pool, NewTalkGroup::new(system.id, 100, "Fire Dispatch"))
        .await
        .unwrap();
    let police = create_talkgroup(pool, NewTalkGroup::new(system.id, 200, "Police Tac"))
        .await
        .unwrap();

    create_talkgroup_acl(
        pool,
        NewTalkGroupAcl {
            name: "fire".to_string(),
            users: vec![member],
            talkgroups: vec![fire.id],
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let recorder = create_recorder(pool, NewRecorder::new(system.id, "site-1"))
        .await
        .unwrap();

    Seed {
        admin,
        member,
        outsider,
        system_id: system.id,
        fire,
        police,
        recorder,
    }
}

pub struct TestEnv {
    pub pool: SqlitePool,
    pub blobs: Arc<dyn BlobStore>,
    pub live: LiveBroadcaster,
    pub gateway: Arc<RecordingGateway>,
    pub forwarder: Arc<RecordingForwarder>,
    pub state: AppState,
    pub seed: Seed,
    runner_handle: Option<RunnerHandle>,
    audio_dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_runner(RunnerConfig::default()).await
    }

    pub async fn with_runner(config: RunnerConfig) -> Self {
        let pool = init_memory_database().await.unwrap();
        let seed = seed(&pool).await;

        let audio_dir = tempfile::tempdir().unwrap();
        let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(audio_dir.path().to_path_buf()));
        let live = LiveBroadcaster::new(64);
        let gateway = Arc::new(RecordingGateway::default());
        let forwarder = Arc::new(RecordingForwarder::default());

        let executor = DispatchExecutor::new(
            live.clone(),
            blobs.clone(),
            Some(gateway.clone() as Arc<dyn NotificationGateway>),
            forwarder.clone(),
        );
        let (runner, runner_handle) = TaskRunner::start(config, Arc::new(executor));
        let pipeline = Pipeline::new(pool.clone(), runner);
        let state = AppState::new(pool.clone(), blobs.clone(), live.clone(), pipeline);

        Self {
            pool,
            blobs,
            live,
            gateway,
            forwarder,
            state,
            seed,
            runner_handle: Some(runner_handle),
            audio_dir,
        }
    }

    pub fn app(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    pub async fn ingest(&self, body: Value) -> Result<IngestReceipt, IngestError> {
        let submission: Submission = serde_json::from_value(body).unwrap();
        let ctx = IngestContext {
            db: &self.pool,
            blobs: self.blobs.as_ref(),
            pipeline: &self.state.pipeline,
        };
        ingest(&ctx, submission).await
    }

    /// Wait for every queued dispatch job to finish
    pub async fn drain(&mut self) {
        if let Some(handle) = self.runner_handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
                .await
                .expect("runner did not drain");
        }
    }

    pub fn audio_file_count(&self) -> usize {
        std::fs::read_dir(self.audio_dir.path()).unwrap().count()
    }

    pub async fn count(&self, table: &str) -> i64 {
        count_rows(&self.pool, table).await
    }
}

/// Runner that sheds instead of blocking, for overload tests
pub fn shedding_runner(queue_capacity: usize) -> RunnerConfig {
    RunnerConfig {
        workers: 1,
        queue_capacity,
        queue_full: QueueFullPolicy::Shed,
        job_timeout: Duration::from_secs(2),
    }
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// A trunk-recorder upload with two units keyed up on `talkgroup`
pub fn submission(recorder_key: Uuid, talkgroup: i64) -> Value {
    json!({
        "recorder": recorder_key.to_string(),
        "json": {
            "talkgroup": talkgroup,
            "start_time": CALL_START,
            "stop_time": CALL_START + 4.0,
            "emergency": 0,
            "encrypted": 0,
            "freq": 851_012_500.0,
            "call_length": 4.0,
            "srcList": [
                {"src": 1001, "time": CALL_START, "pos": 0.0, "emergency": 0, "signal_system": "", "tag": "Engine 1"},
                {"src": 1002, "time": CALL_START + 2.0, "pos": 2.5, "emergency": 0, "signal_system": "", "tag": ""}
            ],
            "freqList": [
                {"freq": 851_012_500.0, "time": CALL_START, "pos": 0.0, "len": 4.0, "error_count": 0, "spike_count": 0}
            ]
        },
        "audioFile": STANDARD.encode(AUDIO_BYTES),
        "name": "call.m4a",
    })
}

/// Same as [`submission`] with the emergency flag set
pub fn emergency_submission(recorder_key: Uuid, talkgroup: i64) -> Value {
    let mut body = submission(recorder_key, talkgroup);
    body["json"]["emergency"] = json!(1);
    body
}

pub fn test_request(method: &str, uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, user: Option<Uuid>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}
