mod history;
mod relay;

use axum::{routing::get, Router};

pub use relay::{MessageRelay, OutgoingMessage};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/chat/{room_id}", get(history::history))
        .route("/api/chatroom/{room_id}", get(history::room_trip))
}
