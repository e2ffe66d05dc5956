//! Live connections: who is connected, who they are, and which rooms they listen to.

pub mod events;
mod presence;
mod rooms;
mod ws;

use axum::{routing::get, Router};
use dashmap::DashMap;
use tokio::sync::{mpsc::{self, error::TrySendError}, watch};
use tracing::{debug, warn};
use uuid::Uuid;

pub use events::{ClientEvent, LocationUpdate, ServerEvent};
pub use presence::PresenceRegistry;
pub use rooms::RoomMembership;

use crate::AppState;

pub type ConnectionId = Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::relay_ws))
}

struct Outbound {
    events: mpsc::Sender<ServerEvent>,
    location: watch::Sender<Option<LocationUpdate>>,
}

/// Receiving half of a connection's outbound path.
///
/// Events are queued in order; location keeps only the newest sample.
pub struct Inbox {
    pub events: mpsc::Receiver<ServerEvent>,
    pub location: watch::Receiver<Option<LocationUpdate>>,
}

/// Owns every live connection's outbound path together with the presence
/// registry and room membership. Delivery is best-effort and never blocks:
/// a full or closed connection just misses the event.
pub struct Hub {
    queue: usize,
    connections: DashMap<ConnectionId, Outbound>,
    presence: PresenceRegistry,
    rooms: RoomMembership,
}

impl Hub {
    pub fn new(queue: usize) -> Self {
        Self {
            queue: queue.max(1),
            connections: DashMap::new(),
            presence: PresenceRegistry::default(),
            rooms: RoomMembership::default(),
        }
    }

    pub fn connect(&self) -> (ConnectionId, Inbox) {
        let connection_id = Uuid::now_v7();
        let (events_tx, events_rx) = mpsc::channel(self.queue);
        let (location_tx, location_rx) = watch::channel(None);

        self.connections.insert(connection_id, Outbound {
            events: events_tx,
            location: location_tx,
        });

        (connection_id, Inbox { events: events_rx, location: location_rx })
    }

    /// Forgets the connection everywhere. Safe to call more than once.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        // outbound first, so nothing can be delivered mid-cleanup
        self.connections.remove(&connection_id);
        let user_id = self.presence.unregister(connection_id);
        let rooms = self.rooms.purge(connection_id);
        debug!(%connection_id, ?user_id, rooms = rooms.len(), "connection gone");
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    #[cfg(test)]
    pub(crate) fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Binds a user to a live connection. Unknown connections are refused.
    pub fn register(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        if !self.is_connected(connection_id) {
            return false;
        }
        if let Some(superseded) = self.presence.register(user_id, connection_id) {
            debug!(user_id, %superseded, %connection_id, "presence superseded");
        }
        true
    }

    pub fn join(&self, connection_id: ConnectionId, room_id: &str) -> bool {
        if !self.is_connected(connection_id) {
            return false;
        }
        self.rooms.join(connection_id, room_id);
        true
    }

    pub fn leave(&self, connection_id: ConnectionId, room_id: &str) {
        self.rooms.leave(connection_id, room_id);
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }

    /// Whether `user_id` is reachable and currently listening to `room_id`.
    pub fn user_in_room(&self, user_id: &str, room_id: &str) -> bool {
        self.presence
            .resolve(user_id)
            .is_some_and(|connection_id| self.rooms.is_member(connection_id, room_id))
    }

    pub fn deliver(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let Some(outbound) = self.connections.get(&connection_id) else {
            return false;
        };

        match outbound.events.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%connection_id, "outbound queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(%connection_id, "connection closed, event dropped");
                false
            }
        }
    }

    /// Delivers to every member of the room; returns how many accepted it.
    pub fn fan_out(&self, room_id: &str, event: &ServerEvent) -> usize {
        self.rooms
            .members_of(room_id)
            .into_iter()
            .filter(|connection_id| self.deliver(*connection_id, event.clone()))
            .count()
    }

    /// Overwrites each member's pending location with `update`.
    pub fn push_location(&self, room_id: &str, update: &LocationUpdate) -> usize {
        self.rooms
            .members_of(room_id)
            .into_iter()
            .filter(|connection_id| match self.connections.get(connection_id) {
                Some(outbound) => {
                    outbound.location.send_replace(Some(update.clone()));
                    true
                }
                None => false,
            })
            .count()
    }

    pub fn notify_user(&self, user_id: &str, event: ServerEvent) -> bool {
        match self.presence.resolve(user_id) {
            Some(connection_id) => self.deliver(connection_id, event),
            None => false,
        }
    }
}
