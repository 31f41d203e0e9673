use serde::{Deserialize, Serialize};

use crate::constants::CHAT_MESSAGE_TYPE;

/// Envelope for everything the server pushes to a subscribed destination.
///
/// `payload` stays an untyped JSON value until the consumer knows which
/// `type` it is dealing with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub message_id: String,
    /// Server timestamp in milliseconds. Display only, not an ordering guarantee.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl InboundFrame {
    /// Creates a frame with the given type and payload.
    pub fn new<T: Serialize>(
        frame_type: impl Into<String>,
        message_id: impl Into<String>,
        timestamp: i64,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            frame_type: frame_type.into(),
            message_id: message_id.into(),
            timestamp,
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Returns `true` for `chat.message` frames.
    pub fn is_chat_message(&self) -> bool {
        self.frame_type == CHAT_MESSAGE_TYPE
    }

    /// Deserializes the payload into the given type.
    ///
    /// Returns `Ok(None)` when the payload is absent (`null`).
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        if self.payload.is_null() {
            return Ok(None);
        }
        Ok(Some(T::deserialize(&self.payload)?))
    }
}
