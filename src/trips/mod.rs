mod handlers;
mod machine;
mod otp;
mod tracking;

use axum::{routing::{get, post}, Extension, Router};

pub use machine::{Settlement, TripStateMachine};
pub use otp::OtpGuard;
pub use tracking::{LocationBroadcaster, LocationOutcome};

use crate::{db::TripKind, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/api/rides", lifecycle_routes(TripKind::Ride))
        .nest("/api/goods", lifecycle_routes(TripKind::GoodsDelivery))
}

fn lifecycle_routes(kind: TripKind) -> Router<AppState> {
    Router::new()
        .route("/{id}", get(handlers::trip))
        .route("/{id}/start", post(handlers::start))
        .route("/{id}/complete", post(handlers::complete))
        .layer(Extension(kind))
}
