//! tpng-server: transmission ingestion, access control, and notification fan-out
//!
//! A recorder upload is validated and committed in one transaction, then
//! fanned out asynchronously to live listeners, per-user alerts, and peer
//! instances. A background pruner enforces per-system retention.

pub mod access;
pub mod api;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod live;
pub mod pipeline;
pub mod pruner;
pub mod runner;
pub mod services;

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::live::LiveBroadcaster;
use crate::pipeline::Pipeline;
use crate::services::BlobStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub blobs: Arc<dyn BlobStore>,
    pub live: LiveBroadcaster,
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(db: SqlitePool, blobs: Arc<dyn BlobStore>, live: LiveBroadcaster, pipeline: Pipeline) -> Self {
        Self {
            db,
            blobs,
            live,
            pipeline,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health::health_routes())
        .merge(api::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
