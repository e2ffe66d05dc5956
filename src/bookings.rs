//! Intake for the booking collaborator: an approved booking becomes a pending
//! trip plus the chat room between its captain and passenger.

use std::sync::Arc;

use axum::{debug_handler, extract::State, http::{HeaderMap, StatusCode}, routing::post, Json, Router};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth,
    config::Config,
    db::{ChatRoom, TripKind, TripRef, TripStatus},
    error::TripError,
    notify::Notifier,
    store::Store,
    AppResult, AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bookings/approved", post(booking_approved))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApprovedBooking {
    trip_id: String,
    #[serde(default)]
    trip_model: TripKind,
    captain_id: String,
    passenger_id: String,
    room_id: Option<String>,
    #[serde(default = "one")]
    seats: i64,
}

fn one() -> i64 {
    1
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenedRoom {
    room_id: String,
    trip_id: String,
    trip_model: TripKind,
    status: TripStatus,
}

fn generate_otp() -> String {
    format!("{:04}", rand::rng().random_range(0..10_000))
}

#[debug_handler(state = AppState)]
async fn booking_approved(
    State(config): State<Arc<Config>>,
    State(store): State<Store>,
    State(notifier): State<Notifier>,
    headers: HeaderMap,
    Json(booking): Json<ApprovedBooking>,
) -> AppResult<(StatusCode, Json<OpenedRoom>)> {
    auth::require_collaborator(&headers, &config)?;

    let trip_id = booking.trip_id.trim();
    if trip_id.is_empty() || booking.captain_id.is_empty() || booking.passenger_id.is_empty() {
        return Err(TripError::InvalidMessage("tripId, captainId and passengerId are required".into()))?;
    }
    if booking.captain_id == booking.passenger_id {
        return Err(TripError::InvalidMessage("captain cannot book their own trip".into()))?;
    }

    let trip = TripRef::new(booking.trip_model, trip_id);
    let wanted = ChatRoom {
        room_id: booking.room_id.unwrap_or_else(|| Uuid::now_v7().to_string()),
        trip_id: trip.id.clone(),
        trip_kind: trip.kind,
        captain_id: booking.captain_id,
        passenger_id: booking.passenger_id,
    };

    // a clashing room id must not leave an orphaned trip behind
    if store.room(&wanted.room_id).await?.is_some_and(|existing| existing != wanted) {
        return Err(TripError::InvalidTransition(format!("room {} is bound to another trip", wanted.room_id)))?;
    }

    store.create_trip_if_absent(&trip, &wanted.captain_id, &generate_otp(), booking.seats).await?;

    let Some(current) = store.trip(&trip).await? else {
        return Err(TripError::NotFound(format!("trip {trip}")))?;
    };
    if current.captain_id != wanted.captain_id {
        return Err(TripError::Forbidden(format!("{trip} belongs to another captain")))?;
    }
    if current.status != TripStatus::Pending {
        return Err(TripError::InvalidTransition(format!("{trip} is already {}", current.status)))?;
    }

    let room = store.open_room(&wanted).await?;
    if room != wanted {
        return Err(TripError::InvalidTransition(format!("room {} is bound to another trip", room.room_id)))?;
    }
    info!(%trip, room_id = %room.room_id, "booking approved");

    notifier
        .notify(&room.passenger_id, format!("Your booking is confirmed. Share OTP {} with your captain to start.", current.otp))
        .await;

    Ok((StatusCode::CREATED, Json(OpenedRoom {
        room_id: room.room_id,
        trip_id: trip.id,
        trip_model: trip.kind,
        status: current.status,
    })))
}
