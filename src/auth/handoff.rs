use std::sync::Arc;

use axum::{debug_handler, extract::State, http::HeaderMap, Json};
use tower_sessions::Session;
use tracing::info;

use crate::{config::Config, error::TripError, AppResult, AppState};

use super::{require_collaborator, Identity};

#[debug_handler(state = AppState)]
pub(crate) async fn establish(
    State(config): State<Arc<Config>>,
    headers: HeaderMap,
    session: Session,
    Json(identity): Json<Identity>,
) -> AppResult<Json<Identity>> {
    require_collaborator(&headers, &config)?;

    if identity.user_id.trim().is_empty() {
        return Err(TripError::InvalidMessage("userId is required".into()))?;
    }

    identity.store(&session).await?;
    info!(user_id = %identity.user_id, role = ?identity.role, "session established");

    Ok(Json(identity))
}

#[debug_handler]
pub(crate) async fn me(session: Session) -> AppResult<Json<Identity>> {
    Ok(Json(Identity::require(&session).await?))
}
