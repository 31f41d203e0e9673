//! Room-level chat operations on top of the connection manager.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use chatlink_connection::{
    ConnectError, ConnectionEvent, ConnectionManager, ConnectionStatus, Routed, SubscriptionHandle,
};
use chatlink_protocol::constants::{
    CREATE_ROOM_DESTINATION, ROOM_INFO_DESTINATION, SEND_MESSAGE_DESTINATION, USER_ROOMS_QUEUE,
    room_id_from_topic,
};
use chatlink_protocol::{
    ChatMessage, CreateRoomRequest, InboundFrame, RoomInfoRequest, SendMessageRequest, room_topic,
};

use crate::message_log::MessageLog;

/// Events produced by [`ChatSession::next_event`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Connection status changed.
    Status(ConnectionStatus),
    /// A connection attempt or inbound frame failed.
    Error(ConnectError),
    /// A reconnect attempt was armed.
    ReconnectScheduled { delay: Duration },
    /// A new chat message was added to the log.
    MessageAppended(ChatMessage),
    /// A non-chat frame arrived on a room topic.
    RoomEvent { room_id: String, frame: InboundFrame },
    /// Anything delivered on the user's room queue.
    RoomNotification(Routed),
    /// A room frame whose body was not JSON.
    Undecodable { destination: String, body: String },
}

/// Generates a client idempotency key: `"{unix_millis}-{9 random hex chars}"`.
pub fn generate_client_message_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{millis}-{}", &random[..9])
}

fn lock(log: &Mutex<MessageLog>) -> MutexGuard<'_, MessageLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Chat facade owning one [`ConnectionManager`].
///
/// Rooms joined through [`subscribe_to_room`](Self::subscribe_to_room) are
/// remembered and re-subscribed whenever the connection comes back.
pub struct ChatSession {
    conn: ConnectionManager,
    log: Arc<Mutex<MessageLog>>,
    events_tx: mpsc::UnboundedSender<ChatEvent>,
    events_rx: mpsc::UnboundedReceiver<ChatEvent>,
    rooms: BTreeSet<String>,
    user_queue: bool,
}

impl ChatSession {
    pub fn new(conn: ConnectionManager) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            conn,
            log: Arc::new(Mutex::new(MessageLog::new())),
            events_tx,
            events_rx,
            rooms: BTreeSet::new(),
            user_queue: false,
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub fn connect(&mut self) -> Result<(), ConnectError> {
        self.conn.connect()
    }

    /// Disconnects and forgets the joined rooms.
    pub fn disconnect(&mut self) {
        self.rooms.clear();
        self.user_queue = false;
        self.conn.disconnect();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.conn.status()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Active subscription destinations, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        self.conn.subscriptions()
    }

    /// Rooms to restore after a reconnect.
    pub fn joined_rooms(&self) -> Vec<String> {
        self.rooms.iter().cloned().collect()
    }

    /// Waits for the next event, driving the connection's event loop.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        loop {
            if let Ok(event) = self.events_rx.try_recv() {
                return Some(event);
            }
            let event = self.conn.next_event().await?;
            if let Some(event) = self.on_connection_event(event) {
                return Some(event);
            }
        }
    }

    /// Non-blocking variant of [`next_event`](Self::next_event).
    pub fn try_next_event(&mut self) -> Option<ChatEvent> {
        loop {
            if let Ok(event) = self.events_rx.try_recv() {
                return Some(event);
            }
            let event = self.conn.try_next_event()?;
            if let Some(event) = self.on_connection_event(event) {
                return Some(event);
            }
        }
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) -> Option<ChatEvent> {
        match event {
            ConnectionEvent::StatusChanged(status) => {
                if status == ConnectionStatus::Connected {
                    self.restore_subscriptions();
                }
                Some(ChatEvent::Status(status))
            }
            ConnectionEvent::Error(e) => Some(ChatEvent::Error(e)),
            ConnectionEvent::ReconnectScheduled { delay } => {
                Some(ChatEvent::ReconnectScheduled { delay })
            }
            ConnectionEvent::FrameDelivered { destination } => {
                trace!(destination = %destination, "frame delivered");
                None
            }
        }
    }

    fn restore_subscriptions(&mut self) {
        let rooms: Vec<String> = self
            .rooms
            .iter()
            .filter(|room| !self.conn.is_subscribed(&room_topic(room)))
            .cloned()
            .collect();
        for room in rooms {
            if self.subscribe_room_inner(&room).is_some() {
                info!(room = %room, "room subscription restored");
            }
        }
        if self.user_queue && !self.conn.is_subscribed(USER_ROOMS_QUEUE) {
            self.subscribe_user_queue_inner();
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Subscribes to `/topic/chat/{room_id}`. Chat messages are appended to
    /// the log (duplicates dropped); other frames surface as
    /// [`ChatEvent::RoomEvent`]. Returns `None` unless connected.
    pub fn subscribe_to_room(&mut self, room_id: &str) -> Option<SubscriptionHandle> {
        if !self.conn.is_connected() {
            debug!(room = %room_id, "not connected, room subscription skipped");
            return None;
        }
        let handle = self.subscribe_room_inner(room_id)?;
        self.rooms.insert(room_id.to_string());
        Some(handle)
    }

    /// Leaves a room. Returns `false` if it was not joined.
    pub fn leave_room(&mut self, room_id: &str) -> bool {
        let joined = self.rooms.remove(room_id);
        let unsubscribed = self.conn.unsubscribe(&room_topic(room_id));
        joined || unsubscribed
    }

    /// Subscribes to `/user/queue/rooms`. Every delivery surfaces as
    /// [`ChatEvent::RoomNotification`]. Returns `None` unless connected.
    pub fn subscribe_to_user_queue(&mut self) -> Option<SubscriptionHandle> {
        if !self.conn.is_connected() {
            debug!("not connected, user queue subscription skipped");
            return None;
        }
        let handle = self.subscribe_user_queue_inner()?;
        self.user_queue = true;
        Some(handle)
    }

    /// Raw subscribe, bypassing room bookkeeping.
    pub fn subscribe(
        &mut self,
        destination: &str,
        callback: impl FnMut(Routed) + Send + 'static,
    ) -> Option<SubscriptionHandle> {
        self.conn.subscribe(destination, callback)
    }

    pub fn unsubscribe(&mut self, destination: &str) -> bool {
        self.conn.unsubscribe(destination)
    }

    fn subscribe_room_inner(&mut self, room_id: &str) -> Option<SubscriptionHandle> {
        let destination = room_topic(room_id);
        let handler = room_handler(
            destination.clone(),
            self.log.clone(),
            self.events_tx.clone(),
        );
        self.conn.subscribe(&destination, handler)
    }

    fn subscribe_user_queue_inner(&mut self) -> Option<SubscriptionHandle> {
        let events = self.events_tx.clone();
        self.conn.subscribe(USER_ROOMS_QUEUE, move |routed| {
            let _ = events.send(ChatEvent::RoomNotification(routed));
        })
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Publishes any serializable body. See
    /// [`ConnectionManager::send_message`].
    pub fn send_message(&self, destination: &str, body: &Value) -> bool {
        self.conn.send_message(destination, body, &[])
    }

    /// Sends a chat message to a room. A client message id is generated
    /// when none is supplied.
    pub fn send_chat_message(
        &self,
        room_id: &str,
        content: &str,
        client_message_id: Option<&str>,
    ) -> bool {
        let client_message_id = match client_message_id {
            Some(id) => id.to_string(),
            None => generate_client_message_id(),
        };
        let request = SendMessageRequest {
            room_id: room_id.to_string(),
            content: content.to_string(),
            client_message_id,
        };
        let sent = self
            .conn
            .send_message(SEND_MESSAGE_DESTINATION, &request, &[]);
        if sent {
            debug!(room = %room_id, client_message_id = %request.client_message_id, "chat message sent");
        }
        sent
    }

    /// Asks the server to create a room. The result arrives on the user
    /// queue.
    pub fn create_room(&self, room_name: &str, participant_ids: &[String]) -> bool {
        let request = CreateRoomRequest {
            room_name: room_name.to_string(),
            participant_ids: participant_ids.to_vec(),
        };
        self.conn
            .send_message(CREATE_ROOM_DESTINATION, &request, &[])
    }

    /// Asks the server for a room's details.
    pub fn request_room_info(&self, room_id: &str) -> bool {
        let request = RoomInfoRequest {
            room_id: room_id.to_string(),
        };
        self.conn.send_message(ROOM_INFO_DESTINATION, &request, &[])
    }

    // -----------------------------------------------------------------------
    // Message log
    // -----------------------------------------------------------------------

    /// Messages received so far, in arrival order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.log).snapshot()
    }

    pub fn message_count(&self) -> usize {
        lock(&self.log).len()
    }

    pub fn clear_messages(&self) {
        lock(&self.log).clear();
    }
}

fn room_handler(
    destination: String,
    log: Arc<Mutex<MessageLog>>,
    events: mpsc::UnboundedSender<ChatEvent>,
) -> impl FnMut(Routed) + Send + 'static {
    let room_id = room_id_from_topic(&destination)
        .unwrap_or(&destination)
        .to_string();
    move |routed| {
        let value = match routed {
            Routed::Json(value) => value,
            Routed::Raw(body) => {
                let _ = events.send(ChatEvent::Undecodable {
                    destination: destination.clone(),
                    body,
                });
                return;
            }
        };

        let frame: InboundFrame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(destination = %destination, error = %e, "room frame is not an envelope");
                let _ = events.send(ChatEvent::Error(ConnectError::FrameDecodeFailure(
                    e.to_string(),
                )));
                return;
            }
        };

        if !frame.is_chat_message() {
            let _ = events.send(ChatEvent::RoomEvent {
                room_id: room_id.clone(),
                frame,
            });
            return;
        }

        match frame.parse_payload::<ChatMessage>() {
            Ok(Some(message)) => {
                if lock(&log).append(message.clone()) {
                    let _ = events.send(ChatEvent::MessageAppended(message));
                } else {
                    debug!(room = %room_id, message_id = %message.message_id, "duplicate message dropped");
                }
            }
            Ok(None) => warn!(room = %room_id, "chat message frame without payload"),
            Err(e) => {
                warn!(room = %room_id, error = %e, "invalid chat message payload");
                let _ = events.send(ChatEvent::Error(ConnectError::FrameDecodeFailure(
                    e.to_string(),
                )));
            }
        }
    }
}
