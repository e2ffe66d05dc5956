pub mod auth;
pub mod bookings;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod notify;
pub mod realtime;
pub mod res;
pub mod session;
pub mod store;
pub mod trips;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing::error;

use crate::{
    chat::MessageRelay,
    config::Config,
    error::TripError,
    notify::Notifier,
    realtime::Hub,
    store::Store,
    trips::{LocationBroadcaster, OtpGuard, TripStateMachine},
};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub hub: Arc<Hub>,
    pub notifier: Notifier,
    pub relay: Arc<MessageRelay>,
    pub tracker: Arc<LocationBroadcaster>,
    pub trips: Arc<TripStateMachine>,
}

impl AppState {
    pub fn new(config: Config, db_pool: SqlitePool) -> Self {
        let store = Store::new(db_pool);
        let hub = Arc::new(Hub::new(config.outbound_queue));
        let notifier = Notifier::new(store.clone(), hub.clone());
        let relay = Arc::new(MessageRelay::new(store.clone(), hub.clone(), notifier.clone()));
        let tracker = Arc::new(LocationBroadcaster::new(hub.clone()));
        let trips = Arc::new(TripStateMachine::new(
            store.clone(),
            hub.clone(),
            tracker.clone(),
            notifier.clone(),
            OtpGuard::new(config.otp_max_attempts, config.otp_lockout),
        ));

        Self {
            config: Arc::new(config),
            store,
            hub,
            notifier,
            relay,
            tracker,
            trips,
        }
    }
}

/// Every route, with sessions, CORS and request tracing applied.
pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(state.config.session_idle_minutes)));

    let cors = match state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(err) => {
            error!(origin = %state.config.cors_origin, %err, "bad CORS_ORIGIN, cross-origin requests disabled");
            CorsLayer::new()
        }
    };

    Router::new()
        .merge(auth::router())
        .merge(bookings::router())
        .merge(chat::router())
        .merge(notify::router())
        .merge(realtime::router())
        .merge(trips::router())
        .with_state(state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.0.downcast::<TripError>() {
            Ok(err) => err.into_response(),
            Err(err) => {
                error!("{err}\n\n{}", err.backtrace());
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self(anyhow::Error::from(TripError::from(err)))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(TripError);
apperr_impl!(serde_json::Error);
apperr_impl!(tower_sessions::session::Error);
