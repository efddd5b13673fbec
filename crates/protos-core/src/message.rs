//! Wire messages received over the notification connection
//!
//! Every frame is a JSON envelope:
//!
//! ```json
//! {"type": "update", "update": { ... }}
//! ```
//!
//! Only `update` is meaningful. Any other type is a protocol error that ends
//! the session.

use crate::error::{Error, Result};
use crate::resource::Resource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Message type carrying an update payload
pub const MSG_TYPE_UPDATE: &str = "update";

/// Decoded envelope of an inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message type discriminant
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Update payload (present for `update` messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
}

impl InboundMessage {
    /// Decode an envelope from a raw frame
    pub fn decode(frame: &[u8]) -> Result<Self> {
        serde_json::from_slice(frame).map_err(|e| Error::malformed(e.to_string()))
    }

    /// Extract the update payload, rejecting any other message type
    pub fn into_update(self) -> Result<Update> {
        if self.msg_type != MSG_TYPE_UPDATE {
            return Err(Error::UnsupportedMessageType(self.msg_type));
        }

        let payload = self
            .update
            .ok_or_else(|| Error::malformed("update message carries no payload"))?;

        Ok(Update::from_payload(payload))
    }
}

/// Decode a raw frame straight into its update payload
pub fn decode_update(frame: &[u8]) -> Result<Update> {
    InboundMessage::decode(frame)?.into_update()
}

/// Payload of an `update` message
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// The payload is a resource record
    Resource(Resource),
    /// Any payload this crate does not recognize, kept verbatim
    Unknown(Value),
}

impl Update {
    /// Classify a raw update payload
    ///
    /// Objects with both an `id` and a string `type` are treated as resources.
    /// If such an object fails to decode it is kept as `Unknown`.
    pub fn from_payload(payload: Value) -> Self {
        let looks_like_resource = payload.get("id").is_some()
            && payload.get("type").and_then(Value::as_str).is_some();

        if looks_like_resource {
            match serde_json::from_value::<Resource>(payload.clone()) {
                Ok(resource) => return Update::Resource(resource),
                Err(e) => debug!("Update payload is not a valid resource: {}", e),
            }
        }

        Update::Unknown(payload)
    }

    /// The resource carried by this update, if any
    pub fn resource(&self) -> Option<&Resource> {
        match self {
            Update::Resource(resource) => Some(resource),
            Update::Unknown(_) => None,
        }
    }

    /// The payload as JSON
    pub fn to_json(&self) -> Value {
        match self {
            Update::Resource(resource) => serde_json::to_value(resource).unwrap_or(Value::Null),
            Update::Unknown(value) => value.clone(),
        }
    }
}
