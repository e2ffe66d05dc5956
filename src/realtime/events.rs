use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{db::{ChatMessage, TripKind, TripStatus}, error::ErrorBody};

/// Frames a client may send, as `{"event": ..., "data": ...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Register(String),
    JoinRoom(String),
    LeaveRoom(String),
    SendMessage(SendMessage),
    LocationUpdate(LocationPost),
}

/// `senderId` and `createdAt` may be present on the wire but are never trusted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub room_id: String,
    #[serde(default)]
    pub trip_model: TripKind,
    #[serde(default)]
    pub sender: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPost {
    pub trip_id: String,
    #[serde(default)]
    pub trip_model: TripKind,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub trip_id: String,
    pub trip_model: TripKind,
    pub lat: f64,
    pub lng: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Registered {
        connection_id: Uuid,
    },
    Message(ChatMessage),
    LocationUpdate(LocationUpdate),
    #[serde(rename = "new_notification")]
    NewNotification {
        message: String,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    TripStarted {
        trip_id: String,
        trip_model: TripKind,
        status: TripStatus,
    },
    TripCompleted {
        trip_id: String,
        trip_model: TripKind,
        status: TripStatus,
        payment_url: String,
    },
    Error(ErrorBody),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_client_frames() {
        let register: ClientEvent = serde_json::from_value(json!({"event": "register", "data": "u1"})).unwrap();
        assert!(matches!(register, ClientEvent::Register(user) if user == "u1"));

        let send: ClientEvent = serde_json::from_value(json!({
            "event": "sendMessage",
            "data": {
                "roomId": "r1",
                "tripModel": "Ride",
                "sender": "Alice",
                "senderId": "spoofed",
                "text": "hello",
                "createdAt": "2020-01-01T00:00:00Z"
            }
        })).unwrap();
        let ClientEvent::SendMessage(send) = send else { panic!("expected sendMessage") };
        assert_eq!(send.room_id, "r1");
        assert_eq!(send.sender, "Alice");

        let location: ClientEvent = serde_json::from_value(json!({
            "event": "locationUpdate",
            "data": {"tripId": "rideA", "lat": 12.9, "lng": 77.6}
        })).unwrap();
        let ClientEvent::LocationUpdate(location) = location else { panic!("expected locationUpdate") };
        assert_eq!(location.trip_model, TripKind::Ride);
    }

    #[test]
    fn notification_keeps_its_wire_name() {
        let event = ServerEvent::NewNotification {
            message: "approved".into(),
            timestamp: OffsetDateTime::UNIX_EPOCH,
        };
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["event"], "new_notification");
        assert_eq!(value["data"]["message"], "approved");
        assert_eq!(value["data"]["timestamp"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn trip_completed_is_camel_case() {
        let event = ServerEvent::TripCompleted {
            trip_id: "rideA".into(),
            trip_model: TripKind::Ride,
            status: TripStatus::Completed,
            payment_url: "/payment/rideA".into(),
        };
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["event"], "tripCompleted");
        assert_eq!(value["data"]["paymentUrl"], "/payment/rideA");
        assert_eq!(value["data"]["status"], "completed");
    }
}
