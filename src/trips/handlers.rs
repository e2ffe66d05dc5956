use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, Extension, Json};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    auth::Identity,
    db::{TripKind, TripRef, TripStatus},
    AppResult, AppState,
};

use super::TripStateMachine;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TripView {
    trip_id: String,
    trip_model: TripKind,
    status: TripStatus,
    captain_id: String,
    seats: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Transitioned {
    trip_id: String,
    trip_model: TripKind,
    status: TripStatus,
}

#[derive(Deserialize)]
pub(crate) struct StartBody {
    otp: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn trip(
    State(trips): State<Arc<TripStateMachine>>,
    Extension(kind): Extension<TripKind>,
    session: Session,
    Path(id): Path<String>,
) -> AppResult<Json<TripView>> {
    Identity::require(&session).await?;

    let trip = trips.trip(&TripRef::new(kind, id)).await?;
    Ok(Json(TripView {
        trip_id: trip.trip.id,
        trip_model: trip.trip.kind,
        status: trip.status,
        captain_id: trip.captain_id,
        seats: trip.seats,
    }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn start(
    State(trips): State<Arc<TripStateMachine>>,
    Extension(kind): Extension<TripKind>,
    session: Session,
    Path(id): Path<String>,
    Json(StartBody { otp }): Json<StartBody>,
) -> AppResult<Json<Transitioned>> {
    let identity = Identity::require(&session).await?;
    let trip = TripRef::new(kind, id);

    let status = trips.start(&trip, &identity.user_id, &otp).await?;
    Ok(Json(Transitioned { trip_id: trip.id, trip_model: kind, status }))
}

#[debug_handler(state = AppState)]
pub(crate) async fn complete(
    State(trips): State<Arc<TripStateMachine>>,
    Extension(kind): Extension<TripKind>,
    session: Session,
    Path(id): Path<String>,
) -> AppResult<Json<Transitioned>> {
    let identity = Identity::require(&session).await?;
    let trip = TripRef::new(kind, id);

    let status = trips.complete(&trip, &identity.user_id).await?;
    Ok(Json(Transitioned { trip_id: trip.id, trip_model: kind, status }))
}
