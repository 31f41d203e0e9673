use std::time::Duration;

/// Path of the STOMP-over-WebSocket endpoint on the chat server.
pub const CHAT_ENDPOINT_PATH: &str = "/ws/chat";

/// Query parameter carrying the session token during the handshake.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Publish destination for chat messages (`SendMessageRequest`).
pub const SEND_MESSAGE_DESTINATION: &str = "/app/send-message";

/// Publish destination for room creation (`CreateRoomRequest`).
pub const CREATE_ROOM_DESTINATION: &str = "/app/create-room";

/// Publish destination for room info lookups (`RoomInfoRequest`).
pub const ROOM_INFO_DESTINATION: &str = "/app/room-info";

/// Per-user notification queue (room invitations, created rooms).
pub const USER_ROOMS_QUEUE: &str = "/user/queue/rooms";

/// Prefix of the per-room broadcast topic.
pub const ROOM_TOPIC_PREFIX: &str = "/topic/chat/";

/// Inbound frame type carrying a [`ChatMessage`](crate::messages::ChatMessage) payload.
pub const CHAT_MESSAGE_TYPE: &str = "chat.message";

/// Fixed delay before an automatic reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Time to wait for any incoming message before the socket is considered dead.
///
/// Acts as a read deadline: pongs, broker frames and heart-beats all reset it.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send WebSocket pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Maximum inbound message size in bytes (1 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// STOMP protocol versions offered during CONNECT.
pub const STOMP_ACCEPT_VERSION: &str = "1.2,1.1";

/// Returns the broadcast topic for a room.
pub fn room_topic(room_id: &str) -> String {
    format!("{ROOM_TOPIC_PREFIX}{room_id}")
}

/// Extracts the room ID from a room topic, if `destination` is one.
pub fn room_id_from_topic(destination: &str) -> Option<&str> {
    destination
        .strip_prefix(ROOM_TOPIC_PREFIX)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_topic_format() {
        assert_eq!(room_topic("r1"), "/topic/chat/r1");
    }

    #[test]
    fn room_id_from_topic_roundtrip() {
        assert_eq!(room_id_from_topic(&room_topic("abc")), Some("abc"));
        assert_eq!(room_id_from_topic("/topic/chat/"), None);
        assert_eq!(room_id_from_topic(USER_ROOMS_QUEUE), None);
    }

    #[test]
    fn reconnect_delay_is_three_seconds() {
        assert_eq!(RECONNECT_DELAY, Duration::from_secs(3));
    }
}
