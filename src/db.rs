use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TripKind {
    #[default]
    Ride,
    GoodsDelivery,
}

impl TripKind {
    pub fn as_str(&self) -> &'static str {
        use TripKind::*;
        match self {
            Ride => "Ride",
            GoodsDelivery => "GoodsDelivery",
        }
    }

    /// Sibling table holding this kind of trip, and its capacity column.
    pub(crate) fn table(&self) -> (&'static str, &'static str) {
        use TripKind::*;
        match self {
            Ride => ("rides", "seats"),
            GoodsDelivery => ("goods_deliveries", "capacity"),
        }
    }
}

impl fmt::Display for TripKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Ride" => Ok(TripKind::Ride),
            "GoodsDelivery" => Ok(TripKind::GoodsDelivery),
            other => Err(format!("unknown trip model {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Pending,
    Started,
    Completed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        use TripStatus::*;
        match self {
            Pending => "pending",
            Started => "started",
            Completed => "completed",
        }
    }
}

impl fmt::Display for TripStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TripStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TripStatus::Pending),
            "started" => Ok(TripStatus::Started),
            "completed" => Ok(TripStatus::Completed),
            other => Err(format!("unknown trip status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRef {
    #[serde(rename = "tripModel")]
    pub kind: TripKind,
    #[serde(rename = "tripId")]
    pub id: String,
}

impl TripRef {
    pub fn new(kind: TripKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn ride(id: impl Into<String>) -> Self {
        Self::new(TripKind::Ride, id)
    }
}

impl fmt::Display for TripRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub trip: TripRef,
    pub captain_id: String,
    pub status: TripStatus,
    pub otp: String,
    pub seats: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub room_id: String,
    pub trip_id: String,
    #[serde(rename = "tripModel")]
    pub trip_kind: TripKind,
    pub captain_id: String,
    pub passenger_id: String,
}

impl ChatRoom {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.captain_id == user_id || self.passenger_id == user_id
    }

    /// The participant who is not `user_id`, if `user_id` is one of the two.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.captain_id == user_id {
            Some(&self.passenger_id)
        } else if self.passenger_id == user_id {
            Some(&self.captain_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub room_id: String,
    #[serde(rename = "tripModel")]
    pub trip_kind: TripKind,
    #[serde(rename = "sender")]
    pub sender_display_name: String,
    pub sender_id: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub(crate) fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_ms(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub(crate) fn to_ms(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_counterpart() {
        let room = ChatRoom {
            room_id: "r1".into(),
            trip_id: "rideA".into(),
            trip_kind: TripKind::Ride,
            captain_id: "cap1".into(),
            passenger_id: "u1".into(),
        };

        assert_eq!(room.counterpart("cap1"), Some("u1"));
        assert_eq!(room.counterpart("u1"), Some("cap1"));
        assert_eq!(room.counterpart("stranger"), None);
        assert!(!room.is_participant("stranger"));
    }

    #[test]
    fn millis_survive_conversion() {
        let ms = 1_760_000_000_123;
        assert_eq!(to_ms(from_ms(ms)), ms);
    }

    #[test]
    fn wire_names() {
        assert_eq!(serde_json::to_value(TripStatus::Started).unwrap(), "started");
        assert_eq!(serde_json::to_value(TripKind::GoodsDelivery).unwrap(), "GoodsDelivery");
        assert_eq!("GoodsDelivery".parse::<TripKind>(), Ok(TripKind::GoodsDelivery));
        assert!("Bus".parse::<TripKind>().is_err());
        assert_eq!(TripKind::default(), TripKind::Ride);
    }
}
