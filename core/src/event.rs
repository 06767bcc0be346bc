//! Domain events and the JSON envelope codec.
//!
//! Events are immutable facts about an aggregate, and the only unit of
//! persisted change. At rest every event is a self-describing JSON envelope:
//!
//! ```json
//! { "EventName": "FarmCreated", "EventData": { "Name": "Acme Farm", ... } }
//! ```
//!
//! # Codec design
//!
//! Each aggregate family defines one closed event enum, serialized with
//! serde's *adjacent tagging* (`tag = "EventName"`, `content = "EventData"`)
//! so that the envelope **is** the serialized form of the enum. Decoding an
//! unrecognized `EventName` — or an unknown discriminant inside a
//! polymorphic field such as a water source — is a [`CodecError`], never a
//! silent default.
//!
//! ```
//! use grange_core::event::{DomainEvent, decode, encode};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! #[serde(tag = "EventName", content = "EventData")]
//! enum FarmEvent {
//!     FarmCreated { name: String },
//!     FarmNameChanged { name: String },
//! }
//!
//! impl DomainEvent for FarmEvent {
//!     fn event_type(&self) -> &'static str {
//!         match self {
//!             FarmEvent::FarmCreated { .. } => "FarmCreated",
//!             FarmEvent::FarmNameChanged { .. } => "FarmNameChanged",
//!         }
//!     }
//! }
//! ```

use crate::stream::{StreamId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Envelope field holding the event-type name.
pub const EVENT_NAME_FIELD: &str = "EventName";

/// Envelope field holding the event payload.
pub const EVENT_DATA_FIELD: &str = "EventData";

/// Errors raised by the event codec.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Failed to serialize an event payload.
    #[error("failed to encode event '{event_type}': {message}")]
    Encode {
        /// The event-type name being encoded.
        event_type: String,
        /// Underlying serde error.
        message: String,
    },

    /// Failed to deserialize an event payload. Also raised for an
    /// unrecognized `EventName` or an unknown nested discriminant.
    #[error("failed to decode event '{event_type}': {message}")]
    Decode {
        /// The event-type name being decoded.
        event_type: String,
        /// Underlying serde error.
        message: String,
    },

    /// A stored envelope was missing its `EventName` field.
    #[error("malformed event envelope: {0}")]
    MalformedEnvelope(String),
}

/// An event emitted by one aggregate family.
///
/// Implementors are closed enums, one variant per state transition, with
/// serde adjacent tagging matching the at-rest envelope (see module docs).
/// `event_type` must return the same name the serde tag produces; the event
/// bus keys its subscriptions on it.
pub trait DomainEvent:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Stable name of this event (the envelope's `EventName`).
    fn event_type(&self) -> &'static str;
}

/// An encoded event ready for appending to the store.
///
/// Produced by [`encode`]; the store assigns stream position and timestamp
/// when it persists the event as an [`EventRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedEvent {
    /// The event-type name (e.g. `"FarmCreated"`).
    pub event_type: String,

    /// The JSON payload (the envelope's `EventData`).
    pub data: Value,
}

impl fmt::Display for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerializedEvent {{ type: {} }}", self.event_type)
    }
}

/// One persisted row of an aggregate's event log.
///
/// Records are immutable once appended; there is no update or delete on
/// the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// The aggregate this event belongs to.
    pub stream_id: StreamId,

    /// The version this event produced (1 for the first event).
    pub version: Version,

    /// When the store appended this event.
    pub created_at: DateTime<Utc>,

    /// The event-type name.
    pub event_type: String,

    /// The JSON payload.
    pub data: Value,
}

impl EventRecord {
    /// Reassemble the at-rest envelope for this record.
    #[must_use]
    pub fn envelope(&self) -> Value {
        envelope(&self.event_type, self.data.clone())
    }
}

/// Build a `{ "EventName", "EventData" }` envelope value.
#[must_use]
pub fn envelope(event_type: &str, data: Value) -> Value {
    let mut map = serde_json::Map::with_capacity(2);
    map.insert(EVENT_NAME_FIELD.to_string(), Value::String(event_type.to_string()));
    map.insert(EVENT_DATA_FIELD.to_string(), data);
    Value::Object(map)
}

/// Split a stored envelope into `(event_type, data)`.
///
/// # Errors
///
/// Returns [`CodecError::MalformedEnvelope`] if the value is not an object
/// or has no string `EventName`.
pub fn split_envelope(value: Value) -> Result<(String, Value), CodecError> {
    let Value::Object(mut map) = value else {
        return Err(CodecError::MalformedEnvelope(
            "envelope is not a JSON object".to_string(),
        ));
    };
    let name = match map.remove(EVENT_NAME_FIELD) {
        Some(Value::String(name)) => name,
        _ => {
            return Err(CodecError::MalformedEnvelope(format!(
                "envelope has no string '{EVENT_NAME_FIELD}' field"
            )));
        }
    };
    let data = map.remove(EVENT_DATA_FIELD).unwrap_or(Value::Null);
    Ok((name, data))
}

/// Encode an event into its wire form.
///
/// The type name is derived from the event's concrete variant; the payload
/// is the envelope's `EventData`.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serde serialization fails.
pub fn encode<E: DomainEvent>(event: &E) -> Result<SerializedEvent, CodecError> {
    let envelope = serde_json::to_value(event).map_err(|e| CodecError::Encode {
        event_type: event.event_type().to_string(),
        message: e.to_string(),
    })?;
    let (event_type, data) = split_envelope(envelope)?;
    Ok(SerializedEvent { event_type, data })
}

/// Decode a persisted record back into a typed event.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the record's `event_type` is not a
/// variant of `E`, or if the payload does not match the variant's shape
/// (including an unknown discriminant inside a polymorphic field).
pub fn decode<E: DomainEvent>(record: &EventRecord) -> Result<E, CodecError> {
    decode_parts(&record.event_type, record.data.clone())
}

/// Decode from a raw `(event_type, data)` pair.
///
/// # Errors
///
/// Same failure modes as [`decode`].
pub fn decode_parts<E: DomainEvent>(event_type: &str, data: Value) -> Result<E, CodecError> {
    serde_json::from_value(envelope(event_type, data)).map_err(|e| CodecError::Decode {
        event_type: event_type.to_string(),
        message: e.to_string(),
    })
}
