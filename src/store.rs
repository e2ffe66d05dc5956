use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::{from_ms, now_ms, to_ms, ChatMessage, ChatRoom, Notification, Trip, TripKind, TripRef, TripStatus};

/// Record store for trips, chat rooms, messages and notifications.
///
/// Lifecycle fields of a trip are only written through [`Store::transition`],
/// which is a single conditional `UPDATE` and therefore atomic per trip.
#[derive(Clone)]
pub struct Store {
    db_pool: SqlitePool,
}

type MessageRow = (String, String, String, String, String, String, i64);
type RoomRow = (String, String, String, String, String);

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

impl Store {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub async fn trip(&self, trip: &TripRef) -> Result<Option<Trip>, sqlx::Error> {
        let (table, capacity) = trip.kind.table();
        let row: Option<(String, String, String, i64)> =
            sqlx::query_as(&format!("SELECT captain_id,status,otp,{capacity} FROM {table} WHERE id=?"))
                .bind(&trip.id)
                .fetch_optional(&self.db_pool)
                .await?;

        let Some((captain_id, status, otp, seats)) = row else {
            return Ok(None);
        };

        Ok(Some(Trip {
            trip: trip.clone(),
            captain_id,
            status: status.parse().map_err(decode_err)?,
            otp,
            seats,
        }))
    }

    /// Inserts a pending trip unless one with the same id exists. Returns whether a row was written.
    pub async fn create_trip_if_absent(
        &self,
        trip: &TripRef,
        captain_id: &str,
        otp: &str,
        seats: i64,
    ) -> Result<bool, sqlx::Error> {
        let (table, capacity) = trip.kind.table();
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {table} (id,captain_id,status,otp,{capacity}) VALUES (?,?,'pending',?,?)"
        ))
            .bind(&trip.id)
            .bind(captain_id)
            .bind(otp)
            .bind(seats)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Moves `trip` from `from` to `to` only if it is still in `from`, is driven by
    /// `captain_id` and, when given, carries `otp`. Returns whether the row changed.
    pub async fn transition(
        &self,
        trip: &TripRef,
        captain_id: &str,
        from: TripStatus,
        to: TripStatus,
        otp: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let (table, _) = trip.kind.table();
        let result = sqlx::query(&format!(
            "UPDATE {table} SET status=? WHERE id=? AND captain_id=? AND status=? AND (? IS NULL OR otp=?)"
        ))
            .bind(to.as_str())
            .bind(&trip.id)
            .bind(captain_id)
            .bind(from.as_str())
            .bind(otp)
            .bind(otp)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn started_trips(&self, kind: TripKind) -> Result<Vec<Trip>, sqlx::Error> {
        let (table, capacity) = kind.table();
        let rows: Vec<(String, String, String, i64)> =
            sqlx::query_as(&format!("SELECT id,captain_id,otp,{capacity} FROM {table} WHERE status='started'"))
                .fetch_all(&self.db_pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, captain_id, otp, seats)| Trip {
                trip: TripRef::new(kind, id),
                captain_id,
                status: TripStatus::Started,
                otp,
                seats,
            })
            .collect())
    }

    /// Registers a room unless the id is taken, then returns whatever is stored under it.
    pub async fn open_room(&self, room: &ChatRoom) -> Result<ChatRoom, sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO chat_rooms (room_id,trip_id,trip_kind,captain_id,passenger_id,created_at_ms) VALUES (?,?,?,?,?,?)")
            .bind(&room.room_id)
            .bind(&room.trip_id)
            .bind(room.trip_kind.as_str())
            .bind(&room.captain_id)
            .bind(&room.passenger_id)
            .bind(now_ms())
            .execute(&self.db_pool)
            .await?;

        self.room(&room.room_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn room(&self, room_id: &str) -> Result<Option<ChatRoom>, sqlx::Error> {
        let row: Option<RoomRow> =
            sqlx::query_as("SELECT room_id,trip_id,trip_kind,captain_id,passenger_id FROM chat_rooms WHERE room_id=?")
                .bind(room_id)
                .fetch_optional(&self.db_pool)
                .await?;

        row.map(room_from_row).transpose()
    }

    pub async fn rooms_for_trip(&self, trip: &TripRef) -> Result<Vec<ChatRoom>, sqlx::Error> {
        let rows: Vec<RoomRow> =
            sqlx::query_as("SELECT room_id,trip_id,trip_kind,captain_id,passenger_id FROM chat_rooms WHERE trip_kind=? AND trip_id=? ORDER BY created_at_ms")
                .bind(trip.kind.as_str())
                .bind(&trip.id)
                .fetch_all(&self.db_pool)
                .await?;

        rows.into_iter().map(room_from_row).collect()
    }

    pub async fn append_message(&self, message: &ChatMessage) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO messages (id,room_id,sender_id,sender_name,text,trip_kind,created_at_ms) VALUES (?,?,?,?,?,?,?)")
            .bind(message.id.to_string())
            .bind(&message.room_id)
            .bind(&message.sender_id)
            .bind(&message.sender_display_name)
            .bind(&message.text)
            .bind(message.trip_kind.as_str())
            .bind(to_ms(message.created_at))
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }

    /// Messages of a room in delivery order: timestamp, then arrival.
    pub async fn messages(&self, room_id: &str) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows: Vec<MessageRow> =
            sqlx::query_as("SELECT id,room_id,sender_id,sender_name,text,trip_kind,created_at_ms FROM messages WHERE room_id=? ORDER BY created_at_ms,seq")
                .bind(room_id)
                .fetch_all(&self.db_pool)
                .await?;

        rows.into_iter()
            .map(|(id, room_id, sender_id, sender_display_name, text, trip_kind, created_at_ms)| {
                Ok(ChatMessage {
                    id: Uuid::parse_str(&id).map_err(|e| decode_err(e.to_string()))?,
                    room_id,
                    trip_kind: trip_kind.parse().map_err(decode_err)?,
                    sender_display_name,
                    sender_id,
                    text,
                    created_at: from_ms(created_at_ms),
                })
            })
            .collect()
    }

    pub async fn last_message_ms(&self, room_id: &str) -> Result<Option<i64>, sqlx::Error> {
        let (last,): (Option<i64>,) = sqlx::query_as("SELECT MAX(created_at_ms) FROM messages WHERE room_id=?")
            .bind(room_id)
            .fetch_one(&self.db_pool)
            .await?;

        Ok(last)
    }

    pub async fn insert_notification(&self, notification: &Notification) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO notifications (id,user_id,message,created_at_ms) VALUES (?,?,?,?)")
            .bind(notification.id.to_string())
            .bind(&notification.user_id)
            .bind(&notification.message)
            .bind(to_ms(notification.created_at))
            .execute(&self.db_pool)
            .await?;

        Ok(())
    }

    /// Newest first.
    pub async fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>, sqlx::Error> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT id,message,created_at_ms FROM notifications WHERE user_id=? ORDER BY created_at_ms DESC, seq DESC")
                .bind(user_id)
                .fetch_all(&self.db_pool)
                .await?;

        rows.into_iter()
            .map(|(id, message, created_at_ms)| {
                Ok(Notification {
                    id: Uuid::parse_str(&id).map_err(|e| decode_err(e.to_string()))?,
                    user_id: user_id.to_owned(),
                    message,
                    created_at: from_ms(created_at_ms),
                })
            })
            .collect()
    }
}

fn room_from_row((room_id, trip_id, trip_kind, captain_id, passenger_id): RoomRow) -> Result<ChatRoom, sqlx::Error> {
    Ok(ChatRoom {
        room_id,
        trip_id,
        trip_kind: trip_kind.parse().map_err(decode_err)?,
        captain_id,
        passenger_id,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::res;

    pub(crate) async fn memory_store() -> Store {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        res::apply_schema(&db_pool).await.unwrap();
        Store::new(db_pool)
    }

    #[tokio::test]
    async fn transition_is_conditional() {
        let store = memory_store().await;
        let ride = TripRef::ride("rideA");
        assert!(store.create_trip_if_absent(&ride, "cap1", "4821", 3).await.unwrap());
        assert!(!store.create_trip_if_absent(&ride, "cap2", "0000", 1).await.unwrap());

        assert!(!store.transition(&ride, "cap1", TripStatus::Pending, TripStatus::Started, Some("0000")).await.unwrap());
        assert!(!store.transition(&ride, "cap2", TripStatus::Pending, TripStatus::Started, Some("4821")).await.unwrap());
        assert!(store.transition(&ride, "cap1", TripStatus::Pending, TripStatus::Started, Some("4821")).await.unwrap());
        assert!(!store.transition(&ride, "cap1", TripStatus::Pending, TripStatus::Started, Some("4821")).await.unwrap());

        let trip = store.trip(&ride).await.unwrap().unwrap();
        assert_eq!(trip.status, TripStatus::Started);
        assert_eq!(trip.otp, "4821");
        assert_eq!(trip.seats, 3);
        assert_eq!(store.started_trips(TripKind::Ride).await.unwrap().len(), 1);
        assert!(store.started_trips(TripKind::GoodsDelivery).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn kinds_resolve_to_sibling_tables() {
        let store = memory_store().await;
        store.create_trip_if_absent(&TripRef::new(TripKind::GoodsDelivery, "g1"), "cap1", "1111", 20).await.unwrap();

        assert!(store.trip(&TripRef::ride("g1")).await.unwrap().is_none());
        let goods = store.trip(&TripRef::new(TripKind::GoodsDelivery, "g1")).await.unwrap().unwrap();
        assert_eq!(goods.seats, 20);
    }

    #[tokio::test]
    async fn rooms_keep_their_first_registration() {
        let store = memory_store().await;
        let room = ChatRoom {
            room_id: "r1".into(),
            trip_id: "rideA".into(),
            trip_kind: TripKind::Ride,
            captain_id: "cap1".into(),
            passenger_id: "u1".into(),
        };
        assert_eq!(store.open_room(&room).await.unwrap(), room);

        let clash = ChatRoom { trip_kind: TripKind::GoodsDelivery, ..room.clone() };
        assert_eq!(store.open_room(&clash).await.unwrap(), room);
        assert_eq!(store.rooms_for_trip(&TripRef::ride("rideA")).await.unwrap(), vec![room]);
    }
}
