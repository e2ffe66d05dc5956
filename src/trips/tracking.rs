use std::{collections::HashSet, sync::Arc};

use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    db::TripRef,
    error::{TripError, TripResult},
    realtime::{Hub, LocationUpdate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationOutcome {
    /// Sample was pushed to this many connections.
    Broadcast(usize),
    /// Trip is not started; the sample was dropped.
    Suppressed,
}

struct ActiveTrip {
    captain_id: String,
    rooms: HashSet<String>,
}

/// Relays captain positions to a trip's rooms while the trip is started.
/// Nothing is stored; each member only ever holds the newest sample.
pub struct LocationBroadcaster {
    hub: Arc<Hub>,
    active: DashMap<TripRef, ActiveTrip>,
}

impl LocationBroadcaster {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            active: DashMap::new(),
        }
    }

    pub fn enable(&self, trip: &TripRef, captain_id: &str, rooms: impl IntoIterator<Item = String>) {
        self.active.insert(trip.clone(), ActiveTrip {
            captain_id: captain_id.to_owned(),
            rooms: rooms.into_iter().collect(),
        });
        debug!(%trip, "location broadcast enabled");
    }

    pub fn disable(&self, trip: &TripRef) -> bool {
        let was_active = self.active.remove(trip).is_some();
        debug!(%trip, was_active, "location broadcast disabled");
        was_active
    }

    pub fn is_enabled(&self, trip: &TripRef) -> bool {
        self.active.contains_key(trip)
    }

    pub fn post_location(&self, trip: &TripRef, sender_id: &str, lat: f64, lng: f64) -> TripResult<LocationOutcome> {
        if !lat.is_finite() || !lng.is_finite() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(TripError::InvalidMessage(format!("coordinates out of range: {lat},{lng}")));
        }

        let rooms: Vec<String> = {
            let Some(active) = self.active.get(trip) else {
                debug!(%trip, sender_id, "location suppressed, trip not started");
                return Ok(LocationOutcome::Suppressed);
            };
            if active.captain_id != sender_id {
                return Err(TripError::Forbidden(format!("only the captain of {trip} shares its location")));
            }
            active.rooms.iter().cloned().collect()
        };

        let update = LocationUpdate {
            trip_id: trip.id.clone(),
            trip_model: trip.kind,
            lat,
            lng,
            timestamp: OffsetDateTime::now_utc(),
        };

        let delivered = rooms
            .iter()
            .map(|room_id| self.hub.push_location(room_id, &update))
            .sum();
        Ok(LocationOutcome::Broadcast(delivered))
    }
}
