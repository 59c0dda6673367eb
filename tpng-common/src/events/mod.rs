//! Live event types and the in-process EventBus
//!
//! Events are published to a [`Room`]; listeners subscribe to the bus and
//! keep only the rooms they joined. Delivery is best-effort: a listener that
//! is disconnected or lagging simply misses events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Event name for a newly ingested transmission
pub const NEW_TRANSMISSION_EVENT: &str = "new_transmission";

/// Event name for a web notification addressed to one user
pub const USER_NOTIFICATION_EVENT: &str = "user_notification";

/// Publish/subscribe scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Room {
    /// Every talkgroup of a system
    System { system_id: Uuid },
    /// One talkgroup of a system
    Talkgroup { system_id: Uuid, talkgroup_id: Uuid },
    /// Notifications addressed to a single user
    User { user_id: Uuid },
}

impl Room {
    pub fn for_talkgroup(system_id: Uuid, talkgroup_id: Uuid) -> Self {
        Room::Talkgroup {
            system_id,
            talkgroup_id,
        }
    }

    /// Whether a listener joined to `self` receives events published to `target`
    ///
    /// A system room covers every talkgroup room of the same system.
    pub fn covers(&self, target: &Room) -> bool {
        match (self, target) {
            (Room::System { system_id: a }, Room::System { system_id: b }) => a == b,
            (Room::System { system_id: a }, Room::Talkgroup { system_id: b, .. }) => a == b,
            (Room::Talkgroup { .. }, Room::Talkgroup { .. }) => self == target,
            (Room::User { user_id: a }, Room::User { user_id: b }) => a == b,
            _ => false,
        }
    }

    /// Talkgroup this room is scoped to, if any
    pub fn talkgroup_id(&self) -> Option<Uuid> {
        match self {
            Room::Talkgroup { talkgroup_id, .. } => Some(*talkgroup_id),
            _ => None,
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::System { system_id } => write!(f, "system/{}", system_id),
            Room::Talkgroup {
                system_id,
                talkgroup_id,
            } => write!(f, "system/{}/talkgroup/{}", system_id, talkgroup_id),
            Room::User { user_id } => write!(f, "user/{}", user_id),
        }
    }
}

/// One event pushed to a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEvent {
    pub room: Room,
    /// SSE event name (e.g. `new_transmission`)
    pub event: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl LiveEvent {
    pub fn new(room: Room, event: &str, payload: serde_json::Value) -> Self {
        Self {
            room,
            event: event.to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast bus carrying [`LiveEvent`]s to every subscribed listener
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LiveEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events a slow listener may fall behind
    /// before it starts missing events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: LiveEvent) -> Result<usize, broadcast::error::SendError<LiveEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: LiveEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
