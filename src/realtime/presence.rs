use std::{collections::HashMap, sync::{Mutex, PoisonError}};

use super::ConnectionId;

/// Which connection currently speaks for a user. One connection per user:
/// a later registration supersedes the earlier one.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: Mutex<Bindings>,
}

#[derive(Default)]
struct Bindings {
    by_user: HashMap<String, ConnectionId>,
    by_connection: HashMap<ConnectionId, String>,
}

impl PresenceRegistry {
    /// Binds `user_id` to `connection_id` and returns the connection it superseded, if any.
    pub fn register(&self, user_id: &str, connection_id: ConnectionId) -> Option<ConnectionId> {
        let mut bindings = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        // a connection speaks for one user at a time
        if let Some(previous_user) = bindings.by_connection.remove(&connection_id) {
            if previous_user != user_id {
                bindings.by_user.remove(&previous_user);
            }
        }

        let superseded = bindings.by_user.insert(user_id.to_owned(), connection_id);
        if let Some(old) = superseded.filter(|old| *old != connection_id) {
            bindings.by_connection.remove(&old);
        }
        bindings.by_connection.insert(connection_id, user_id.to_owned());

        superseded.filter(|old| *old != connection_id)
    }

    pub fn resolve(&self, user_id: &str) -> Option<ConnectionId> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_user
            .get(user_id)
            .copied()
    }

    #[cfg(test)]
    pub(crate) fn user_of(&self, connection_id: ConnectionId) -> Option<String> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_connection
            .get(&connection_id)
            .cloned()
    }

    /// Drops whatever binding points at `connection_id`; returns the user it was bound to.
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<String> {
        let mut bindings = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let user_id = bindings.by_connection.remove(&connection_id)?;
        if bindings.by_user.get(&user_id) == Some(&connection_id) {
            bindings.by_user.remove(&user_id);
        }
        Some(user_id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).by_user.len()
    }
}
