// src/core/events.rs

//! The typed event envelope exchanged over every session, and the payload
//! shapes of the built-in event types.
//!
//! On the wire an event is `{"type": "...", "payload": {...}}`. The payload is
//! kept as raw JSON until the handler registered for `type` asks for it, so the
//! reader loop never has to know the concrete payload shapes.

use crate::core::RelayError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Sent by a client to broadcast a chat message to its current room.
pub const EVENT_SEND_MESSAGE: &str = "send_message";
/// Delivered to every member of a room in response to `send_message`.
pub const EVENT_NEW_MESSAGE: &str = "new_message";
/// Sent by a client to move itself to another room.
pub const EVENT_CHANGE_ROOM: &str = "change_room";

/// An immutable, tagged message. The payload stays encoded until a handler
/// decodes it with [`Event::payload_as`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Box<RawValue>>,
}

impl Event {
    /// Builds an event by encoding `payload` as its raw JSON body.
    pub fn new<T: Serialize>(kind: impl Into<String>, payload: &T) -> Result<Self, RelayError> {
        let payload =
            serde_json::value::to_raw_value(payload).map_err(|e| RelayError::Encode(e.to_string()))?;
        Ok(Self {
            kind: kind.into(),
            payload: Some(payload),
        })
    }

    /// Decodes one inbound frame into an event envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self, RelayError> {
        serde_json::from_slice(bytes).map_err(|e| RelayError::MalformedEvent(e.to_string()))
    }

    /// Encodes the event as the JSON text sent in an outbound frame.
    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Encode(e.to_string()))
    }

    /// The event type tag used for routing.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The raw JSON payload, if the sender supplied one.
    pub fn raw_payload(&self) -> Option<&str> {
        self.payload.as_deref().map(RawValue::get)
    }

    /// Lazily decodes the payload into the shape expected by a handler.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, RelayError> {
        let raw = self
            .payload
            .as_deref()
            .ok_or_else(|| RelayError::BadPayload("missing payload".to_string()))?;
        serde_json::from_str(raw.get()).map_err(|e| RelayError::BadPayload(e.to_string()))
    }
}

/// Payload of `send_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub message: String,
    pub from: String,
}

/// Payload of `new_message`: the original message stamped with the time the
/// relay accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessagePayload {
    pub message: String,
    pub from: String,
    pub sent: DateTime<Utc>,
}

impl NewMessagePayload {
    pub fn stamped(msg: SendMessagePayload, sent: DateTime<Utc>) -> Self {
        Self {
            message: msg.message,
            from: msg.from,
            sent,
        }
    }
}

/// Payload of `change_room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRoomPayload {
    pub name: String,
}
