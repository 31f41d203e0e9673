pub mod constants;
pub mod envelope;
pub mod messages;
pub mod stomp;

// Re-export primary types for convenience.
pub use constants::{CHAT_MESSAGE_TYPE, room_topic};
pub use envelope::InboundFrame;
pub use messages::{ChatMessage, CreateRoomRequest, RoomInfoRequest, SendMessageRequest, Sender};
pub use stomp::{Command, Frame, FrameError};
