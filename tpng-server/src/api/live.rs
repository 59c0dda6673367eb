//! Server-Sent Events for live transmissions and user notifications

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tpng_common::events::{LiveEvent, Room};
use tracing::{debug, warn};
use uuid::Uuid;

use super::auth::CurrentUser;
use super::systems::visible_system;
use crate::access::{allowed_talkgroups, can_view_talkgroup};
use crate::error::{ApiError, ApiResult};
use crate::live::LiveSubscription;
use crate::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub system: Uuid,
    pub talkgroup: Option<Uuid>,
}

/// GET /api/live?system=&talkgroup=
///
/// Joins the talkgroup room when `talkgroup` is given, otherwise the system
/// room filtered to the talkgroups the caller may view.
pub async fn live_stream(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
    Query(query): Query<LiveQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let system = visible_system(&state, query.system, &auth).await?;

    let subscription = match query.talkgroup {
        Some(talkgroup_id) => {
            if !can_view_talkgroup(&state.db, &system, talkgroup_id, &auth).await? {
                return Err(ApiError::Forbidden(format!("Talkgroup {}", talkgroup_id)));
            }
            LiveSubscription::new(Room::for_talkgroup(system.id, talkgroup_id))
        }
        None => {
            let room = LiveSubscription::new(Room::System { system_id: system.id });
            if auth.is_site_admin || !system.enable_talkgroup_acls {
                room
            } else {
                let talkgroups = allowed_talkgroups(&state.db, &system, &auth).await?;
                room.with_allowed_talkgroups(talkgroups.into_iter().map(|tg| tg.id))
            }
        }
    };

    debug!(user_id = %auth.user_id, room = %subscription.room, "New live listener");
    Ok(into_sse(state.live.subscribe(subscription)))
}

/// GET /api/live/notifications
///
/// Web notifications addressed to the caller.
pub async fn notification_stream(
    State(state): State<AppState>,
    CurrentUser(auth): CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(user_id = %auth.user_id, "New notification listener");
    let mut events = Box::pin(
        state
            .live
            .subscribe(LiveSubscription::new(Room::User { user_id: auth.user_id })),
    );

    let stream = async_stream::stream! {
        while let Some(event) = events.next().await {
            match serde_json::to_string(&event.payload) {
                Ok(json) => {
                    debug!(user_id = %auth.user_id, "Delivering notification");
                    yield Ok(Event::default().event(event.event).data(json));
                }
                Err(e) => warn!("Failed to serialize notification: {}", e),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

fn into_sse(
    events: impl Stream<Item = LiveEvent> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = events.filter_map(|event| async move {
        match serde_json::to_string(&event.payload) {
            Ok(json) => Some(Ok(Event::default().event(event.event).data(json))),
            Err(e) => {
                warn!("Failed to serialize live event: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}
