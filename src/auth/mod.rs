mod handoff;
mod logout;

use axum::{http::HeaderMap, routing::{get, post}, Router};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::{
    config::Config,
    error::{TripError, TripResult},
    session::{DISPLAY_NAME, ROLE, USER_ID},
    AppResult, AppState,
};

pub const COLLABORATOR_KEY_HEADER: &str = "x-collaborator-key";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/session", post(handoff::establish))
        .route("/api/auth/me", get(handoff::me))
        .route("/logout", get(logout::logout))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Captain,
}

/// Who is behind a request, as handed over by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub name: String,
}

impl Identity {
    pub async fn from_session(session: &Session) -> Result<Option<Identity>, tower_sessions::session::Error> {
        let Some(user_id) = session.get::<String>(USER_ID).await? else {
            return Ok(None);
        };

        Ok(Some(Identity {
            user_id,
            role: session.get(ROLE).await?.unwrap_or_default(),
            name: session.get(DISPLAY_NAME).await?.unwrap_or_default(),
        }))
    }

    pub async fn require(session: &Session) -> AppResult<Identity> {
        match Self::from_session(session).await? {
            Some(identity) => Ok(identity),
            None => Err(TripError::Unauthorized)?,
        }
    }

    pub(crate) async fn store(&self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        session.cycle_id().await?;
        session.insert(USER_ID, &self.user_id).await?;
        session.insert(ROLE, self.role).await?;
        session.insert(DISPLAY_NAME, &self.name).await?;
        Ok(())
    }
}

/// Checks the shared secret collaborators present on service-to-service calls.
pub fn require_collaborator(headers: &HeaderMap, config: &Config) -> TripResult<()> {
    let presented = headers
        .get(COLLABORATOR_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match presented {
        Some(key) if !config.collaborator_key.is_empty() && key == config.collaborator_key => Ok(()),
        _ => Err(TripError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn collaborator_key_must_match() {
        let config = Config::for_tests();
        let mut headers = HeaderMap::new();
        assert_eq!(require_collaborator(&headers, &config).unwrap_err().kind(), "Unauthorized");

        headers.insert(COLLABORATOR_KEY_HEADER, HeaderValue::from_static("nope"));
        assert!(require_collaborator(&headers, &config).is_err());

        headers.insert(COLLABORATOR_KEY_HEADER, HeaderValue::from_static("test-key"));
        assert!(require_collaborator(&headers, &config).is_ok());
    }

    #[test]
    fn identity_wire_shape() {
        let identity: Identity = serde_json::from_str(r#"{"userId":"cap1","role":"captain","name":"Ravi"}"#).unwrap();
        assert_eq!(identity.role, Role::Captain);

        let bare: Identity = serde_json::from_str(r#"{"userId":"u1"}"#).unwrap();
        assert_eq!((bare.role, bare.name.as_str()), (Role::User, ""));
    }
}
