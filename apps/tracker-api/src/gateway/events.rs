//! Tracking event names and wire-format messages.
//!
//! Every frame is a JSON text message `{ "event": <name>, "data": <payload> }`,
//! the plain-WebSocket equivalent of a socket.io named event.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use utoipa::ToSchema;

use crate::models::position::{PositionSample, ResponderIdentity};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names shared with the mobile and dashboard clients.
pub struct EventName;

impl EventName {
    /// Responder -> server position fix, and server -> viewer incremental update.
    pub const LOCATION_UPDATE: &'static str = "ems-location-update";
    /// Server -> viewer snapshot of every tracked responder.
    pub const LOCATIONS_SNAPSHOT: &'static str = "ems-locations-broadcast";
    /// Server -> viewer notice that a responder's track was purged.
    pub const LOCATION_REMOVED: &'static str = "ems-location-removed";
    pub const READY: &'static str = "ready";
    pub const HEARTBEAT: &'static str = "heartbeat";
    pub const HEARTBEAT_ACK: &'static str = "heartbeat-ack";
    pub const ERROR: &'static str = "error";
}

/// Error codes carried by `error` events.
pub const ERROR_INVALID_PAYLOAD: &str = "INVALID_PAYLOAD";
pub const ERROR_NOT_RESPONDER: &str = "NOT_RESPONDER";
pub const ERROR_UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";

// ---------------------------------------------------------------------------
// Server -> Client message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event: &'static str,
    pub data: Value,
}

impl ServerEvent {
    pub fn new(event: &'static str, data: Value) -> Self {
        Self { event, data }
    }

    /// Sent once after the upgrade completes.
    pub fn ready(session_id: &str, role: &str, heartbeat_interval_ms: u64) -> Self {
        Self::new(
            EventName::READY,
            json!({
                "session_id": session_id,
                "role": role,
                "heartbeat_interval": heartbeat_interval_ms,
            }),
        )
    }

    pub fn heartbeat_ack() -> Self {
        Self::new(EventName::HEARTBEAT_ACK, json!({}))
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self::new(EventName::ERROR, json!({ "code": code, "message": message }))
    }

    pub fn location_update(identity: &ResponderIdentity, sample: &PositionSample) -> Self {
        Self::new(
            EventName::LOCATION_UPDATE,
            OutboundUpdate::new(identity, sample).to_value(),
        )
    }

    pub fn snapshot(latest: &[(ResponderIdentity, PositionSample)]) -> Self {
        let items = latest
            .iter()
            .map(|(identity, sample)| OutboundUpdate::new(identity, sample).to_value())
            .collect();
        Self::new(EventName::LOCATIONS_SNAPSHOT, Value::Array(items))
    }

    pub fn location_removed(identity: &ResponderIdentity) -> Self {
        Self::new(
            EventName::LOCATION_REMOVED,
            json!({ "user": { "id": identity.id, "name": identity.name } }),
        )
    }

    /// Serialize into a text frame.
    pub fn into_text(self) -> String {
        let mut frame = Map::with_capacity(2);
        frame.insert("event".to_string(), Value::String(self.event.to_string()));
        frame.insert("data".to_string(), self.data);
        Value::Object(frame).to_string()
    }
}

// ---------------------------------------------------------------------------
// Client -> Server message
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ClientEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

// ---------------------------------------------------------------------------
// ems-location-update payloads
// ---------------------------------------------------------------------------

/// `user` object of an update. Field names are fixed by the mobile client.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
}

/// Position fix as sent by a responder.
#[derive(Debug, Deserialize)]
pub struct InboundUpdate {
    pub user: UserPayload,
    pub location: LocationPayload,
}

/// Position fix as sent to viewers: the inbound shape plus the server
/// receipt timestamp (Unix milliseconds).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OutboundUpdate {
    pub user: UserPayload,
    pub location: LocationPayload,
    pub timestamp: i64,
}

impl OutboundUpdate {
    pub fn new(identity: &ResponderIdentity, sample: &PositionSample) -> Self {
        Self {
            user: UserPayload {
                id: identity.id.clone(),
                name: identity.name.clone(),
            },
            location: LocationPayload {
                lat: sample.lat,
                lng: sample.lng,
            },
            timestamp: sample.timestamp,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "user": { "id": self.user.id, "name": self.user.name },
            "location": { "lat": self.location.lat, "lng": self.location.lng },
            "timestamp": self.timestamp,
        })
    }
}
