use std::{collections::BTreeSet, sync::Arc};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    db::{ChatRoom, Trip, TripKind, TripRef, TripStatus},
    error::{TripError, TripResult},
    notify::Notifier,
    realtime::{Hub, ServerEvent},
    store::Store,
};

use super::{otp::OtpGuard, tracking::LocationBroadcaster};

/// Published when a trip completes; the payment flow listens for these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub trip_id: String,
    pub trip_model: TripKind,
    pub captain_id: String,
}

/// `pending -> started -> completed`, driven only by the trip's captain.
///
/// Every transition is checked against a fresh read for a precise rejection,
/// then committed with a conditional update so two racing calls cannot both win.
/// The per-trip lock is held from that read until the side effects are done.
pub struct TripStateMachine {
    store: Store,
    hub: Arc<Hub>,
    tracker: Arc<LocationBroadcaster>,
    notifier: Notifier,
    otp: OtpGuard,
    settlements: broadcast::Sender<Settlement>,
    locks: DashMap<TripRef, Arc<Mutex<()>>>,
}

impl TripStateMachine {
    pub fn new(
        store: Store,
        hub: Arc<Hub>,
        tracker: Arc<LocationBroadcaster>,
        notifier: Notifier,
        otp: OtpGuard,
    ) -> Self {
        Self {
            store,
            hub,
            tracker,
            notifier,
            otp,
            settlements: broadcast::channel(64).0,
            locks: DashMap::new(),
        }
    }

    pub fn settlements(&self) -> broadcast::Receiver<Settlement> {
        self.settlements.subscribe()
    }

    pub async fn trip(&self, trip: &TripRef) -> TripResult<Trip> {
        self.store
            .trip(trip)
            .await?
            .ok_or_else(|| TripError::NotFound(format!("trip {trip}")))
    }

    pub async fn start(&self, trip: &TripRef, actor_id: &str, supplied_otp: &str) -> TripResult<TripStatus> {
        let lock = self.lock(trip);
        let result = {
            let _held = lock.lock().await;
            self.start_locked(trip, actor_id, supplied_otp).await
        };
        self.release(trip, lock);
        result
    }

    pub async fn complete(&self, trip: &TripRef, actor_id: &str) -> TripResult<TripStatus> {
        let lock = self.lock(trip);
        let result = {
            let _held = lock.lock().await;
            self.complete_locked(trip, actor_id).await
        };
        self.release(trip, lock);
        result
    }

    async fn start_locked(&self, trip: &TripRef, actor_id: &str, supplied_otp: &str) -> TripResult<TripStatus> {
        let current = self.trip(trip).await?;
        if current.captain_id != actor_id {
            return Err(TripError::Forbidden(format!("only the captain of {trip} can start it")));
        }
        if current.status != TripStatus::Pending {
            return Err(TripError::InvalidTransition(format!("{trip} is {}, expected pending", current.status)));
        }

        self.otp.check(trip)?;
        if supplied_otp.trim() != current.otp {
            let locked = self.otp.record_failure(trip);
            warn!(%trip, actor_id, locked, "wrong otp");
            return Err(TripError::OtpMismatch);
        }

        let rooms = self.store.rooms_for_trip(trip).await?;
        let moved = self.store
            .transition(trip, actor_id, TripStatus::Pending, TripStatus::Started, Some(&current.otp))
            .await?;
        if !moved {
            return Err(self.lost_race(trip, TripStatus::Pending).await);
        }
        self.otp.clear(trip);
        info!(%trip, actor_id, "trip started");

        self.tracker.enable(trip, actor_id, rooms.iter().map(|room| room.room_id.clone()));
        self.announce(&rooms, ServerEvent::TripStarted {
            trip_id: trip.id.clone(),
            trip_model: trip.kind,
            status: TripStatus::Started,
        });
        for passenger in passengers(&rooms) {
            self.notifier.notify(passenger, format!("Your {} has started.", kind_label(trip.kind))).await;
        }

        Ok(TripStatus::Started)
    }

    async fn complete_locked(&self, trip: &TripRef, actor_id: &str) -> TripResult<TripStatus> {
        let current = self.trip(trip).await?;
        if current.captain_id != actor_id {
            return Err(TripError::Forbidden(format!("only the captain of {trip} can complete it")));
        }
        if current.status != TripStatus::Started {
            return Err(TripError::InvalidTransition(format!("{trip} is {}, expected started", current.status)));
        }

        let rooms = self.store.rooms_for_trip(trip).await?;
        let moved = self.store
            .transition(trip, actor_id, TripStatus::Started, TripStatus::Completed, None)
            .await?;
        if !moved {
            return Err(self.lost_race(trip, TripStatus::Started).await);
        }
        info!(%trip, actor_id, "trip completed");

        self.tracker.disable(trip);
        self.announce(&rooms, ServerEvent::TripCompleted {
            trip_id: trip.id.clone(),
            trip_model: trip.kind,
            status: TripStatus::Completed,
            payment_url: format!("/payment/{}", trip.id),
        });

        // no subscriber just means no payment flow is listening right now
        let _ = self.settlements.send(Settlement {
            trip_id: trip.id.clone(),
            trip_model: trip.kind,
            captain_id: actor_id.to_owned(),
        });

        for passenger in passengers(&rooms) {
            self.notifier
                .notify(passenger, format!("Your {} is complete. Please proceed to payment.", kind_label(trip.kind)))
                .await;
        }

        Ok(TripStatus::Completed)
    }

    /// Re-enables location broadcast for trips that were started before a restart.
    pub async fn restore_active(&self) -> TripResult<usize> {
        let mut restored = 0;
        for kind in [TripKind::Ride, TripKind::GoodsDelivery] {
            for trip in self.store.started_trips(kind).await? {
                let rooms = self.store.rooms_for_trip(&trip.trip).await?;
                self.tracker.enable(&trip.trip, &trip.captain_id, rooms.into_iter().map(|room| room.room_id));
                restored += 1;
            }
        }
        Ok(restored)
    }

    fn lock(&self, trip: &TripRef) -> Arc<Mutex<()>> {
        self.locks.entry(trip.clone()).or_default().clone()
    }

    fn release(&self, trip: &TripRef, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(trip, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn lost_race(&self, trip: &TripRef, expected: TripStatus) -> TripError {
        match self.store.trip(trip).await {
            Ok(Some(now)) => TripError::InvalidTransition(format!("{trip} is {}, expected {expected}", now.status)),
            Ok(None) => TripError::NotFound(format!("trip {trip}")),
            Err(err) => err.into(),
        }
    }

    fn announce(&self, rooms: &[ChatRoom], event: ServerEvent) {
        for room in rooms {
            self.hub.fan_out(&room.room_id, &event);
        }
    }
}

fn passengers(rooms: &[ChatRoom]) -> BTreeSet<&str> {
    rooms.iter().map(|room| room.passenger_id.as_str()).collect()
}

fn kind_label(kind: TripKind) -> &'static str {
    match kind {
        TripKind::Ride => "ride",
        TripKind::GoodsDelivery => "delivery",
    }
}
