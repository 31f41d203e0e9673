//! WebSocket read pump: decodes STOMP frames and reports them.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use chatlink_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use chatlink_protocol::stomp::{Command, Frame};

use crate::transport::{EventSink, SubscriptionId, TransportEvent};

/// Reads messages from the WebSocket until it closes, fails, goes silent
/// for [`WS_PONG_WAIT`], the broker sends ERROR, or `cancel` fires.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events: &EventSink,
    connected: &Arc<AtomicBool>,
    write_tx: &mpsc::Sender<tungstenite::Message>,
    cancel: &CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    // Any incoming message resets the deadline, not only pongs.
    let pong_deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut pong_deadline => {
                warn!("read deadline expired, closing");
                events.emit(TransportEvent::WebSocketError("read timeout".into()));
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                if handle_text_message(&text, events, connected).is_break() {
                                    break;
                                }
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                debug!(?frame, "received close frame");
                                break;
                            }
                            _ => {} // STOMP runs over text frames only.
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        events.emit(TransportEvent::WebSocketError(e.to_string()));
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::Relaxed);
}

/// Handles one text message. Breaks when the broker reports an ERROR.
fn handle_text_message(
    text: &str,
    events: &EventSink,
    connected: &AtomicBool,
) -> ControlFlow<()> {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return ControlFlow::Continue(());
    }

    let frame = match Frame::decode(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            trace!("heart-beat");
            return ControlFlow::Continue(());
        }
        Err(e) => {
            warn!("failed to parse STOMP frame: {e}");
            return ControlFlow::Continue(());
        }
    };

    trace!(command = %frame.command, "received frame");

    match frame.command {
        Command::Connected => {
            debug!(version = frame.header("version").unwrap_or("?"), "session negotiated");
            connected.store(true, Ordering::Relaxed);
            events.emit(TransportEvent::Connected);
        }
        Command::Message => match frame.header("subscription").map(SubscriptionId::from) {
            Some(subscription) => {
                events.emit(TransportEvent::Frame {
                    subscription,
                    body: frame.body,
                });
            }
            None => warn!("MESSAGE frame without subscription header, dropping"),
        },
        Command::Error => {
            let message = frame
                .header("message")
                .map(str::to_string)
                .unwrap_or_else(|| frame.body.clone());
            connected.store(false, Ordering::Relaxed);
            events.emit(TransportEvent::StompError(message));
            return ControlFlow::Break(());
        }
        Command::Receipt => trace!(receipt = frame.header("receipt-id").unwrap_or("?"), "receipt"),
        other => debug!(command = %other, "unexpected client command from server"),
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopEvent;
    use futures_util::stream;

    fn sink() -> (EventSink, mpsc::UnboundedReceiver<LoopEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink::new(1, tx), rx)
    }

    fn next_transport_event(rx: &mut mpsc::UnboundedReceiver<LoopEvent>) -> TransportEvent {
        match rx.try_recv().expect("event expected") {
            LoopEvent::Transport { event, .. } => event,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn connected_frame_marks_session_up() {
        let (events, mut rx) = sink();
        let connected = AtomicBool::new(false);

        let flow = handle_text_message("CONNECTED\nversion:1.2\n\n\0", &events, &connected);

        assert!(flow.is_continue());
        assert!(connected.load(Ordering::Relaxed));
        assert_eq!(next_transport_event(&mut rx), TransportEvent::Connected);
    }

    #[test]
    fn message_frame_is_forwarded() {
        let (events, mut rx) = sink();
        let connected = AtomicBool::new(true);
        let wire = "MESSAGE\nsubscription:sub-3\ndestination:/topic/chat/r1\n\n{\"a\":1}\0";

        handle_text_message(wire, &events, &connected);

        assert_eq!(
            next_transport_event(&mut rx),
            TransportEvent::Frame {
                subscription: "sub-3".into(),
                body: "{\"a\":1}".into(),
            }
        );
    }

    #[test]
    fn error_frame_breaks() {
        let (events, mut rx) = sink();
        let connected = AtomicBool::new(true);

        let flow = handle_text_message(
            "ERROR\nmessage:Invalid token\n\ndetails\0",
            &events,
            &connected,
        );

        assert!(flow.is_break());
        assert!(!connected.load(Ordering::Relaxed));
        assert_eq!(
            next_transport_event(&mut rx),
            TransportEvent::StompError("Invalid token".into())
        );
    }

    #[test]
    fn heartbeat_and_garbage_are_ignored() {
        let (events, mut rx) = sink();
        let connected = AtomicBool::new(true);

        assert!(handle_text_message("\n", &events, &connected).is_continue());
        assert!(handle_text_message("garbage", &events, &connected).is_continue());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn oversized_message_is_dropped() {
        let (events, mut rx) = sink();
        let connected = AtomicBool::new(true);
        let huge = "x".repeat(WS_MAX_MESSAGE_SIZE + 1);
        handle_text_message(&huge, &events, &connected);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn read_pump_returns_on_stream_end() {
        let (events, _rx) = sink();
        let connected = Arc::new(AtomicBool::new(true));
        let (write_tx, _write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let empty = stream::empty::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(empty, &events, &connected, &write_tx, &cancel).await;

        assert!(!connected.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn read_pump_answers_ping() {
        let (events, _rx) = sink();
        let connected = Arc::new(AtomicBool::new(true));
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let ping = tungstenite::Message::Ping(vec![1, 2].into());
        let pings = stream::iter(vec![Ok::<_, tungstenite::Error>(ping)]);

        read_pump(pings, &events, &connected, &write_tx, &cancel).await;

        let pong = write_rx.recv().await.unwrap();
        assert!(matches!(pong, tungstenite::Message::Pong(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn read_pump_timeout_on_silence() {
        let (events, mut rx) = sink();
        let connected = Arc::new(AtomicBool::new(true));
        let (write_tx, _write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(silent, &events, &connected, &write_tx, &cancel).await;

        assert_eq!(
            next_transport_event(&mut rx),
            TransportEvent::WebSocketError("read timeout".into())
        );
    }

    #[tokio::test]
    async fn read_pump_stops_after_broker_error() {
        let (events, mut rx) = sink();
        let connected = Arc::new(AtomicBool::new(true));
        let (write_tx, _write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let frames = stream::iter(vec![
            Ok::<_, tungstenite::Error>(tungstenite::Message::Text("ERROR\n\nbad\0".into())),
            Ok(tungstenite::Message::Text("CONNECTED\n\n\0".into())),
        ]);

        read_pump(frames, &events, &connected, &write_tx, &cancel).await;

        assert_eq!(
            next_transport_event(&mut rx),
            TransportEvent::StompError("bad".into())
        );
        assert!(rx.try_recv().is_err());
    }
}
