//! Chat session facade for chatlink.
//!
//! Wraps a [`ConnectionManager`](chatlink_connection::ConnectionManager)
//! with room-level operations and keeps a de-duplicated log of the chat
//! messages received on subscribed rooms.

pub mod message_log;
pub mod session;

pub use message_log::MessageLog;
pub use session::{ChatEvent, ChatSession, generate_client_message_id};
