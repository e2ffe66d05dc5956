use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use tower_sessions::Session;

use crate::{auth::Identity, db::{ChatMessage, TripKind}, error::TripError, store::Store, AppResult};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn history(
    State(store): State<Store>,
    session: Session,
    Path(room_id): Path<String>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    let identity = Identity::require(&session).await?;

    if let Some(room) = store.room(&room_id).await? {
        if !room.is_participant(&identity.user_id) {
            return Err(TripError::Forbidden(format!("not a participant of room {room_id}")))?;
        }
    }

    Ok(Json(store.messages(&room_id).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoomTrip {
    room_id: String,
    trip_id: String,
    trip_model: TripKind,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_trip(
    State(store): State<Store>,
    Path(room_id): Path<String>,
) -> AppResult<Json<RoomTrip>> {
    let Some(room) = store.room(&room_id).await? else {
        return Err(TripError::NotFound(format!("chat room {room_id}")))?;
    };

    Ok(Json(RoomTrip {
        room_id: room.room_id,
        trip_id: room.trip_id,
        trip_model: room.trip_kind,
    }))
}
