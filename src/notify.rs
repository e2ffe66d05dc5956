use std::sync::Arc;

use axum::{debug_handler, extract::State, routing::get, Json, Router};
use time::OffsetDateTime;
use tower_sessions::Session;
use tracing::error;
use uuid::Uuid;

use crate::{auth::Identity, db::Notification, realtime::{Hub, ServerEvent}, store::Store, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
}

/// Persists a notification, then pushes it to the user's live connection.
/// Never fails the caller; problems are logged.
#[derive(Clone)]
pub struct Notifier {
    store: Store,
    hub: Arc<Hub>,
}

impl Notifier {
    pub fn new(store: Store, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    /// Returns whether the notification reached a live connection.
    pub async fn notify(&self, user_id: &str, message: impl Into<String>) -> bool {
        let notification = Notification {
            id: Uuid::now_v7(),
            user_id: user_id.to_owned(),
            message: message.into(),
            created_at: OffsetDateTime::now_utc(),
        };

        if let Err(err) = self.store.insert_notification(&notification).await {
            error!(user_id, %err, "notification not stored");
            return false;
        }

        self.hub.notify_user(user_id, ServerEvent::NewNotification {
            message: notification.message,
            timestamp: notification.created_at,
        })
    }
}

#[debug_handler(state = AppState)]
async fn list_notifications(
    State(store): State<Store>,
    session: Session,
) -> AppResult<Json<Vec<Notification>>> {
    let identity = Identity::require(&session).await?;
    Ok(Json(store.notifications_for(&identity.user_id).await?))
}
