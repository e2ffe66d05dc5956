use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    db::{from_ms, now_ms, ChatMessage, TripKind},
    error::{TripError, TripResult},
    notify::Notifier,
    realtime::{Hub, ServerEvent},
    store::Store,
};

#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub room_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub text: String,
    /// Used only when the room was never registered; a registered room's kind wins.
    pub trip_kind: TripKind,
}

/// Last timestamp handed out in a room. `None` until read back from the store.
#[derive(Default)]
struct RoomClock {
    last_ms: Option<i64>,
}

/// Persists chat messages and fans them out to the room.
///
/// Sends to one room are serialised: timestamp, write, broadcast all happen
/// under the room's lock, so every member sees the room in `createdAt` order.
pub struct MessageRelay {
    store: Store,
    hub: Arc<Hub>,
    notifier: Notifier,
    clocks: DashMap<String, Arc<Mutex<RoomClock>>>,
}

impl MessageRelay {
    pub fn new(store: Store, hub: Arc<Hub>, notifier: Notifier) -> Self {
        Self {
            store,
            hub,
            notifier,
            clocks: DashMap::new(),
        }
    }

    /// Registered rooms are private to their captain and passenger.
    pub async fn authorize_join(&self, room_id: &str, user_id: &str) -> TripResult<()> {
        match self.store.room(room_id).await? {
            Some(room) if !room.is_participant(user_id) => {
                Err(TripError::Forbidden(format!("not a participant of room {room_id}")))
            }
            _ => Ok(()),
        }
    }

    pub async fn send(&self, outgoing: OutgoingMessage) -> TripResult<ChatMessage> {
        let text = outgoing.text.trim();
        if text.is_empty() {
            return Err(TripError::InvalidMessage("message text is empty".into()));
        }

        let room = self.store.room(&outgoing.room_id).await?;
        if let Some(room) = &room {
            if !room.is_participant(&outgoing.sender_id) {
                return Err(TripError::Forbidden(format!("not a participant of room {}", room.room_id)));
            }
        }
        let trip_kind = room.as_ref().map_or(outgoing.trip_kind, |room| room.trip_kind);

        let room_id = outgoing.room_id.clone();
        let clock = self.clock(&room_id);
        let committed = self.commit(&clock, outgoing, trip_kind).await;
        drop(clock);
        self.clocks.remove_if(&room_id, |_, clock| Arc::strong_count(clock) == 1);
        let message = committed?;

        if let Some(recipient) = room.as_ref().and_then(|room| room.counterpart(&message.sender_id)) {
            if !self.hub.user_in_room(recipient, &message.room_id) {
                self.notifier
                    .notify(recipient, format!("New message from {}", message.sender_display_name))
                    .await;
            }
        }

        Ok(message)
    }

    /// Timestamps, stores and broadcasts one message while holding its room's clock.
    async fn commit(&self, clock: &Mutex<RoomClock>, outgoing: OutgoingMessage, trip_kind: TripKind) -> TripResult<ChatMessage> {
        let mut clock = clock.lock().await;

        let last_ms = match clock.last_ms {
            Some(last_ms) => Some(last_ms),
            None => self.store.last_message_ms(&outgoing.room_id).await?,
        };
        let created_ms = last_ms.map_or(now_ms(), |last_ms| now_ms().max(last_ms));

        let message = ChatMessage {
            id: Uuid::now_v7(),
            room_id: outgoing.room_id,
            trip_kind,
            sender_display_name: outgoing.sender_display_name,
            sender_id: outgoing.sender_id,
            text: outgoing.text.trim().to_owned(),
            created_at: from_ms(created_ms),
        };

        if let Err(err) = self.store.append_message(&message).await {
            error!(room_id = %message.room_id, %err, "message not stored, nothing broadcast");
            return Err(err.into());
        }
        clock.last_ms = Some(created_ms);

        let delivered = self.hub.fan_out(&message.room_id, &ServerEvent::Message(message.clone()));
        debug!(room_id = %message.room_id, id = %message.id, delivered, "message relayed");
        Ok(message)
    }

    fn clock(&self, room_id: &str) -> Arc<Mutex<RoomClock>> {
        self.clocks.entry(room_id.to_owned()).or_default().clone()
    }
}
