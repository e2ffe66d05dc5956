use std::collections::HashSet;

use dashmap::DashMap;

use super::ConnectionId;

/// Many-to-many map between live connections and the rooms they joined.
#[derive(Default)]
pub struct RoomMembership {
    members: DashMap<String, HashSet<ConnectionId>>,
    joined: DashMap<ConnectionId, HashSet<String>>,
}

impl RoomMembership {
    pub fn join(&self, connection_id: ConnectionId, room_id: &str) {
        self.members.entry(room_id.to_owned()).or_default().insert(connection_id);
        self.joined.entry(connection_id).or_default().insert(room_id.to_owned());
    }

    pub fn leave(&self, connection_id: ConnectionId, room_id: &str) {
        if let Some(mut members) = self.members.get_mut(room_id) {
            members.remove(&connection_id);
        }
        self.members.remove_if(room_id, |_, members| members.is_empty());

        if let Some(mut rooms) = self.joined.get_mut(&connection_id) {
            rooms.remove(room_id);
        }
        self.joined.remove_if(&connection_id, |_, rooms| rooms.is_empty());
    }

    /// Removes the connection from every room it is in. Returns those rooms.
    pub fn purge(&self, connection_id: ConnectionId) -> Vec<String> {
        let Some((_, rooms)) = self.joined.remove(&connection_id) else {
            return Vec::new();
        };

        for room_id in &rooms {
            if let Some(mut members) = self.members.get_mut(room_id) {
                members.remove(&connection_id);
            }
            self.members.remove_if(room_id, |_, members| members.is_empty());
        }

        rooms.into_iter().collect()
    }

    pub fn members_of(&self, room_id: &str) -> Vec<ConnectionId> {
        self.members
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, connection_id: ConnectionId, room_id: &str) -> bool {
        self.members
            .get(room_id)
            .is_some_and(|members| members.contains(&connection_id))
    }

    #[cfg(test)]
    pub(crate) fn rooms_of(&self, connection_id: ConnectionId) -> Vec<String> {
        self.joined
            .get(&connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }
}
