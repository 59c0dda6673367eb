//! Live broadcast gateway
//!
//! Publishes events to rooms over the shared [`EventBus`] and hands each
//! SSE session a filtered view of it. Delivery is best-effort: with no
//! listeners the event is dropped, and a lagging listener skips ahead.

use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use std::collections::HashSet;
use tokio_stream::wrappers::BroadcastStream;
use tpng_common::events::{EventBus, LiveEvent, Room};
use tracing::{debug, warn};
use uuid::Uuid;

/// Which events one session receives
#[derive(Debug, Clone)]
pub struct LiveSubscription {
    pub room: Room,
    /// Talkgroups the subscriber may view; `None` admits every talkgroup
    /// the room covers
    pub allowed_talkgroups: Option<HashSet<Uuid>>,
}

impl LiveSubscription {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            allowed_talkgroups: None,
        }
    }

    pub fn with_allowed_talkgroups(mut self, talkgroups: impl IntoIterator<Item = Uuid>) -> Self {
        self.allowed_talkgroups = Some(talkgroups.into_iter().collect());
        self
    }

    pub fn accepts(&self, event: &LiveEvent) -> bool {
        if !self.room.covers(&event.room) {
            return false;
        }
        match (&self.allowed_talkgroups, event.room.talkgroup_id()) {
            (Some(allowed), Some(talkgroup_id)) => allowed.contains(&talkgroup_id),
            _ => true,
        }
    }
}

#[derive(Clone)]
pub struct LiveBroadcaster {
    bus: EventBus,
}

impl LiveBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            bus: EventBus::new(capacity),
        }
    }

    /// Push an event to every session subscribed to `room`
    pub fn broadcast(&self, room: Room, event: &str, payload: Value) {
        debug!(room = %room, event = %event, listeners = self.bus.subscriber_count(), "Broadcasting live event");
        self.bus.emit_lossy(LiveEvent::new(room, event, payload));
    }

    /// Events matching `subscription`, from now on
    pub fn subscribe(&self, subscription: LiveSubscription) -> impl Stream<Item = LiveEvent> + Send + 'static {
        BroadcastStream::new(self.bus.subscribe()).filter_map(move |result| {
            let item = match result {
                Ok(event) if subscription.accepts(&event) => Some(event),
                Ok(_) => None,
                Err(e) => {
                    warn!(room = %subscription.room, "Live listener lagged: {}", e);
                    None
                }
            };
            async move { item }
        })
    }

    pub fn listener_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}
