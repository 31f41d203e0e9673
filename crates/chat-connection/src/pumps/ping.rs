//! WebSocket ping pump: periodic keepalive pings.

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use chatlink_protocol::constants::WS_PING_PERIOD;

/// Pings every [`WS_PING_PERIOD`] so a quiet room still produces traffic
/// inside the read pump's `WS_PONG_WAIT` deadline.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(WS_PING_PERIOD);
    // The CONNECT frame is the first traffic; no ping needed before it.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if write_tx.send(tungstenite::Message::Ping(Vec::new().into())).await.is_err() {
                    debug!("write pump gone, ping pump exiting");
                    break;
                }
                trace!("ping queued");
            }
        }
    }
}
