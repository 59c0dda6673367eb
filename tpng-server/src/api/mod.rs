//! HTTP API
//!
//! Recorder uploads and peer incidents authenticate by recorder key; every
//! other endpoint requires a caller identity (see [`auth::CurrentUser`]).

pub mod auth;
pub mod health;
pub mod incidents;
pub mod ingest;
pub mod live;
pub mod systems;
pub mod transmissions;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::AppState;

/// Recorder uploads carry base64 audio
pub const INGEST_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Routes under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/transmissions/ingest",
            post(ingest::ingest_transmission).layer(DefaultBodyLimit::max(INGEST_BODY_LIMIT)),
        )
        .route("/api/transmissions", get(transmissions::list_transmissions))
        .route(
            "/api/transmissions/:id",
            get(transmissions::get_transmission).delete(transmissions::delete_transmission),
        )
        .route("/api/systems", get(systems::list_systems))
        .route("/api/systems/:id/talkgroups", get(systems::list_talkgroups))
        .route("/api/incidents", post(incidents::create_incident))
        .route("/api/incidents/forward", post(incidents::receive_forwarded_incident))
        .route(
            "/api/incidents/:id",
            get(incidents::get_incident).put(incidents::update_incident),
        )
        .route("/api/live", get(live::live_stream))
        .route("/api/live/notifications", get(live::notification_stream))
}
