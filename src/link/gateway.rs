//! Outbound path for application envelopes. The gateway is the only way data
//! leaves the process; anything sent while the link is down is dropped.

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::uplink::ConnectionState;
use crate::envelope::Outbound;

pub(crate) type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Write half of the current session, if one is open. The uplink fills the
/// slot on open and empties it on teardown, so the gateway can never transmit
/// into a stale session.
pub(crate) type WriterSlot = Arc<Mutex<Option<WsWriter>>>;

/// Cloneable handle for fire-and-forget sends over the uplink.
///
/// [`Gateway::send`] never blocks and surfaces no errors: when the link is
/// not open the envelope is silently dropped, with no queueing and no
/// delivery confirmation.
#[derive(Clone)]
pub struct Gateway {
    state: watch::Receiver<ConnectionState>,
    writer: WriterSlot,
}

impl Gateway {
    pub(crate) fn new(state: watch::Receiver<ConnectionState>, writer: WriterSlot) -> Self {
        Self { state, writer }
    }

    /// Serializes `envelope` and writes one frame if the link is open;
    /// otherwise a silent no-op. The write itself runs on a spawned task so
    /// the caller never awaits transport backpressure.
    pub fn send(&self, envelope: &Outbound) {
        if *self.state.borrow() != ConnectionState::Open {
            debug!(?envelope, "link not open, dropping outbound envelope");
            return;
        }

        let frame = match serde_json::to_string(envelope) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%error, "failed to serialize outbound envelope");
                return;
            }
        };

        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            let mut slot = writer.lock().await;
            match slot.as_mut() {
                Some(write) => {
                    if let Err(error) = write.send(Message::Text(frame.into())).await {
                        debug!(%error, "outbound write failed, dropping envelope");
                    }
                }
                // The link closed between the state check and the write
                None => debug!("link closed mid-send, dropping envelope"),
            }
        });
    }

    /// A gateway with no session and a permanently idle state, for exercising
    /// consumers without a live link.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        // The receiver keeps reporting Idle after the sender drops
        let (_tx, rx) = watch::channel(ConnectionState::Idle);
        Self {
            state: rx,
            writer: Arc::default(),
        }
    }
}
