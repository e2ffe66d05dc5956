use std::sync::Arc;

use axum::{debug_handler, extract::{ws::{Message, WebSocket}, State, WebSocketUpgrade}, response::Response};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tower_sessions::Session;
use tracing::{debug, info, warn};

use crate::{
    auth::Identity,
    chat::{MessageRelay, OutgoingMessage},
    db::TripRef,
    error::{TripError, TripResult},
    trips::LocationBroadcaster,
    AppResult,
};

use super::{ClientEvent, ConnectionId, Hub, Inbox, ServerEvent};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn relay_ws(
    State(hub): State<Arc<Hub>>,
    State(relay): State<Arc<MessageRelay>>,
    State(tracker): State<Arc<LocationBroadcaster>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let identity = Identity::require(&session).await?;

    Ok(ws.on_upgrade(move |socket| async move {
        let (id, inbox) = hub.connect();
        info!(connection_id = %id, user_id = %identity.user_id, "connected");

        let connection = Connection { id, identity, hub, relay, tracker };
        connection.run(socket, inbox).await;
    }))
}

struct Connection {
    id: ConnectionId,
    identity: Identity,
    hub: Arc<Hub>,
    relay: Arc<MessageRelay>,
    tracker: Arc<LocationBroadcaster>,
}

impl Connection {
    async fn run(self, socket: WebSocket, inbox: Inbox) {
        let (sender, mut receiver) = socket.split();
        let writer = tokio::spawn(write_loop(sender, inbox));

        while let Some(Ok(frame)) = receiver.next().await {
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };

            let event = match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => event,
                Err(err) => {
                    debug!(connection_id = %self.id, %err, "ignoring malformed frame");
                    continue;
                }
            };

            self.dispatch(event).await;
        }

        self.hub.disconnect(self.id);
        writer.abort();
        info!(connection_id = %self.id, user_id = %self.identity.user_id, "disconnected");
    }

    /// Rejections go back to this connection only, as an `error` frame.
    async fn dispatch(&self, event: ClientEvent) {
        if let Err(err) = self.handle(event).await {
            warn!(connection_id = %self.id, kind = err.kind(), %err, "event rejected");
            self.hub.deliver(self.id, ServerEvent::Error(err.body()));
        }
    }

    async fn handle(&self, event: ClientEvent) -> TripResult<()> {
        match event {
            ClientEvent::Register(user_id) => {
                if user_id != self.identity.user_id {
                    return Err(TripError::Forbidden("cannot register as another user".into()));
                }
                self.hub.register(&user_id, self.id);
                self.hub.deliver(self.id, ServerEvent::Registered { connection_id: self.id });
            }
            ClientEvent::JoinRoom(room_id) => {
                self.relay.authorize_join(&room_id, &self.identity.user_id).await?;
                self.hub.join(self.id, &room_id);
            }
            ClientEvent::LeaveRoom(room_id) => {
                self.hub.leave(self.id, &room_id);
            }
            ClientEvent::SendMessage(message) => {
                let sender_display_name = if self.identity.name.is_empty() {
                    message.sender
                } else {
                    self.identity.name.clone()
                };

                self.relay.send(OutgoingMessage {
                    room_id: message.room_id,
                    sender_id: self.identity.user_id.clone(),
                    sender_display_name,
                    text: message.text,
                    trip_kind: message.trip_model,
                }).await?;
            }
            ClientEvent::LocationUpdate(post) => {
                let trip = TripRef::new(post.trip_model, post.trip_id);
                self.tracker.post_location(&trip, &self.identity.user_id, post.lat, post.lng)?;
            }
        }

        Ok(())
    }
}

async fn write_loop(mut sender: SplitSink<WebSocket, Message>, mut inbox: Inbox) {
    loop {
        let event = tokio::select! {
            event = inbox.events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            changed = inbox.location.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = inbox.location.borrow_and_update().clone();
                match latest {
                    Some(update) => ServerEvent::LocationUpdate(update),
                    None => continue,
                }
            }
        };

        let Ok(json) = serde_json::to_string(&event) else {
            continue;
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}
