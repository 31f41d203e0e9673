fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use chatlink_protocol::constants::room_id_from_topic;
    use chatlink_protocol::stomp::{Command, Frame};
    use chatlink_protocol::{
        ChatMessage, CreateRoomRequest, InboundFrame, RoomInfoRequest, SendMessageRequest,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  server: {fixture}\n  client: {reserialized}"
        );
        parsed
    }

    // --- Inbound ---

    #[test]
    fn fixture_chat_message_frame() {
        let frame: InboundFrame = roundtrip_test("chat_message_frame.json");
        assert!(frame.is_chat_message());
        assert_eq!(frame.timestamp, 1_717_171_717_171);

        let msg: ChatMessage = frame.parse_payload().unwrap().unwrap();
        assert_eq!(msg.message_id, "m1");
        assert_eq!(msg.room_id, "r1");
        assert_eq!(msg.sender.nickname, "alice");
        assert_eq!(msg.sequence, 42);
    }

    #[test]
    fn fixture_room_event_frame() {
        let frame: InboundFrame = roundtrip_test("room_event_frame.json");
        assert!(!frame.is_chat_message());
        assert_eq!(frame.payload["userId"], "u2");
    }

    #[test]
    fn chat_message_without_sequence_defaults_to_zero() {
        let mut fixture = load_fixture("chat_message_frame.json")["payload"].clone();
        fixture.as_object_mut().unwrap().remove("sequence");
        let msg: ChatMessage = serde_json::from_value(fixture).unwrap();
        assert_eq!(msg.sequence, 0);
    }

    #[test]
    fn fixture_message_frame_stomp() {
        let frame = Frame::decode(&read_fixture("message_frame.stomp"))
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-0"));
        let destination = frame.header("destination").unwrap();
        assert_eq!(room_id_from_topic(destination), Some("r1"));

        let body: serde_json::Value = serde_json::from_str(&frame.body).unwrap();
        assert_eq!(body["type"], "chat.ping");
    }

    #[test]
    fn fixture_error_frame_stomp() {
        let frame = Frame::decode(&read_fixture("error_frame.stomp"))
            .unwrap()
            .unwrap();
        assert_eq!(frame.command, Command::Error);
        assert_eq!(frame.header("message"), Some("Invalid token"));
        assert_eq!(frame.body, "Authentication failed");
    }

    // --- Outbound ---

    #[test]
    fn fixture_send_message_request() {
        let req: SendMessageRequest = roundtrip_test("send_message_request.json");
        assert_eq!(req.client_message_id, "1717171717171-a1b2c3d4e");
    }

    #[test]
    fn fixture_create_room_request() {
        let req: CreateRoomRequest = roundtrip_test("create_room_request.json");
        assert_eq!(req.participant_ids.len(), 3);
    }

    #[test]
    fn fixture_room_info_request() {
        roundtrip_test::<RoomInfoRequest>("room_info_request.json");
    }

    #[test]
    fn send_frame_matches_broker_expectations() {
        let body = read_fixture("send_message_request.json");
        let body = body.trim();
        let wire = Frame::send("/app/send-message", body, &[]).encode();

        assert!(wire.starts_with("SEND\ndestination:/app/send-message\n"));
        assert!(wire.contains("content-type:application/json\n"));
        assert!(wire.contains(&format!("content-length:{}\n", body.len())));
        assert!(wire.ends_with(&format!("\n\n{body}\0")));
    }
}
