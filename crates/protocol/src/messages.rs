use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

/// Author of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub nickname: String,
}

/// A chat message broadcast to a room topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message_id: String,
    pub room_id: String,
    pub content: String,
    pub sender: Sender,
    pub sent_at: String,
    #[serde(default)]
    pub sequence: i64,
}

impl ChatMessage {
    /// Content-based identity used when a redelivery carries a new `messageId`.
    pub fn content_key(&self) -> (String, String, String) {
        (
            self.content.clone(),
            self.sent_at.clone(),
            self.sender.id.clone(),
        )
    }
}

// ---------------------------------------------------------------------------
// Outbound requests
// ---------------------------------------------------------------------------

/// Body published to `/app/send-message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub room_id: String,
    pub content: String,
    /// Client-generated idempotency key.
    pub client_message_id: String,
}

/// Body published to `/app/create-room`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub room_name: String,
    pub participant_ids: Vec<String>,
}

/// Body published to `/app/room-info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfoRequest {
    pub room_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_request_field_names() {
        let req = SendMessageRequest {
            room_id: "r1".into(),
            content: "hello".into(),
            client_message_id: "1700000000000-abc".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["content"], "hello");
        assert_eq!(json["clientMessageId"], "1700000000000-abc");
    }

    #[test]
    fn create_room_request_field_names() {
        let req = CreateRoomRequest {
            room_name: "team".into(),
            participant_ids: vec!["u1".into(), "u2".into()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["roomName"], "team");
        assert_eq!(json["participantIds"], serde_json::json!(["u1", "u2"]));
    }

    #[test]
    fn chat_message_sequence_defaults() {
        let msg: ChatMessage = serde_json::from_value(serde_json::json!({
            "messageId": "m1",
            "roomId": "r1",
            "content": "hi",
            "sender": {"id": "u1", "nickname": "A"},
            "sentAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(msg.sequence, 0);
    }

    #[test]
    fn content_key_ignores_message_id() {
        let a = ChatMessage {
            message_id: "m1".into(),
            room_id: "r1".into(),
            content: "hi".into(),
            sender: Sender {
                id: "u1".into(),
                nickname: "A".into(),
            },
            sent_at: "t0".into(),
            sequence: 1,
        };
        let mut b = a.clone();
        b.message_id = "m2".into();
        b.sequence = 2;
        assert_eq!(a.content_key(), b.content_key());
    }
}
