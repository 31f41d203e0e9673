//! WebSocket transport: STOMP over tokio-tungstenite.
//!
//! `activate` returns immediately with a [`WsHandle`]; the socket is opened
//! on a spawned task that runs the read, write and ping pumps and reports
//! the session lifecycle through the [`EventSink`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatlink_protocol::constants::WS_MAX_MESSAGE_SIZE;
use chatlink_protocol::stomp::Frame;

use crate::transport::{
    ConnectRequest, EventSink, SubscriptionId, Transport, TransportError, TransportEvent,
    TransportHandle,
};

const OUTBOUND_QUEUE: usize = 256;

/// Opens STOMP sessions over a WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WsTransport {
    fn activate(
        &self,
        request: &ConnectRequest,
        events: EventSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(OUTBOUND_QUEUE);
        let connected = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        // CONNECT goes out first once the write pump starts.
        let connect = Frame::connect(&request.host, &request.token).encode();
        write_tx
            .try_send(tungstenite::Message::Text(connect.into()))
            .map_err(|_| TransportError::Backpressure)?;

        runtime.spawn(run_session(
            request.url.clone(),
            events,
            connected.clone(),
            write_tx.clone(),
            write_rx,
            cancel.clone(),
        ));

        Ok(Box::new(WsHandle {
            write_tx,
            connected,
            cancel,
            next_sub: AtomicU64::new(0),
        }))
    }
}

async fn run_session(
    url: String,
    events: EventSink,
    connected: Arc<AtomicBool>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
    ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

    let ws_stream = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("session cancelled before the socket opened");
            return;
        }
        result = tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false) => {
            match result {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("WebSocket connect failed: {e}");
                    events.emit(TransportEvent::WebSocketError(e.to_string()));
                    return;
                }
            }
        }
    };
    info!("WebSocket connection established");

    let (write, read) = ws_stream.split();

    let write_handle = tokio::spawn(crate::pumps::write::write_pump(
        write,
        write_rx,
        cancel.clone(),
    ));
    let ping_handle = tokio::spawn(crate::pumps::ping::ping_pump(
        write_tx.clone(),
        cancel.clone(),
    ));

    crate::pumps::read::read_pump(read, &events, &connected, &write_tx, &cancel).await;

    connected.store(false, Ordering::Relaxed);
    let deliberate = cancel.is_cancelled();
    cancel.cancel();
    let _ = write_handle.await;
    ping_handle.abort();

    if !deliberate {
        info!("WebSocket session ended");
        events.emit(TransportEvent::Disconnected);
    }
}

/// Handle to one WebSocket session.
pub struct WsHandle {
    write_tx: mpsc::Sender<tungstenite::Message>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    next_sub: AtomicU64,
}

impl WsHandle {
    fn queue(&self, frame: Frame) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let text = frame.encode();
        self.write_tx
            .try_send(tungstenite::Message::Text(text.into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Backpressure,
                TrySendError::Closed(_) => TransportError::Closed,
            })
    }
}

impl TransportHandle for WsHandle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !self.cancel.is_cancelled()
    }

    fn publish(
        &self,
        destination: &str,
        body: &str,
        headers: &[(String, String)],
    ) -> Result<(), TransportError> {
        self.queue(Frame::send(destination, body, headers))
    }

    fn subscribe(&self, destination: &str) -> Result<SubscriptionId, TransportError> {
        let n = self.next_sub.fetch_add(1, Ordering::Relaxed);
        let id = format!("sub-{n}");
        self.queue(Frame::subscribe(&id, destination))?;
        Ok(id.into())
    }

    fn unsubscribe(&self, id: &SubscriptionId) -> Result<(), TransportError> {
        self.queue(Frame::unsubscribe(id.as_str()))
    }

    fn deactivate(&mut self) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self.connected.load(Ordering::Relaxed) {
            let _ = self.queue(Frame::disconnect());
        }
        self.connected.store(false, Ordering::Relaxed);
        self.cancel.cancel();
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
