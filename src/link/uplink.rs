//! Connection supervisor. Owns the uplink lifecycle: token exchange,
//! WebSocket transport, keepalive watchdog and reconnect scheduling. All
//! state transitions happen inside the single [`Uplink::run`] task, so they
//! never interleave.

use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::auth::{fetch_token, AuthError};
use super::backoff::Backoff;
use super::gateway::{Gateway, WriterSlot};
use super::watchdog::Watchdog;
use crate::bus::{Bus, Event};
use crate::config::LinkConfig;
use crate::envelope;

/// Where the uplink is in its lifecycle. Broadcast on a watch channel so the
/// gateway (and tests) can observe transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Authenticating,
    Connecting,
    Open,
    Reconnecting,
}

/// Why an attempt to establish a session failed. All variants are
/// recoverable; the supervisor logs them and schedules a retry.
#[derive(Debug, Error)]
enum EstablishError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The api key cannot ride as a subprotocol header
    #[error("Invalid connection identifier: {0}")]
    Identifier(#[from] InvalidHeaderValue),

    /// Bad transport URL or failed WebSocket handshake
    #[error("Transport failed to open: {0}")]
    Transport(#[from] tungstenite::Error),
}

impl EstablishError {
    /// Structural connection-refused classification; no payload text is
    /// inspected.
    fn is_connection_refused(&self) -> bool {
        matches!(
            self,
            Self::Transport(tungstenite::Error::Io(error))
                if error.kind() == io::ErrorKind::ConnectionRefused
        )
    }
}

/// How a live session ended
#[derive(Debug)]
enum Disconnect {
    /// Close frame with the normal-closure code
    Normal,
    /// Close frame with any other code, or the stream ending without one
    Abnormal(Option<u16>),
    /// The watchdog window elapsed with no keepalive probe
    Stalled,
    /// Socket-level error
    Transport(tungstenite::Error),
}

type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// The connection supervisor. One instance per process; at most one live
/// transport at a time.
pub struct Uplink {
    config: LinkConfig,
    http: reqwest::Client,
    bus: Bus,
    backoff: Backoff,
    state_tx: watch::Sender<ConnectionState>,
    writer: WriterSlot,
}

impl Uplink {
    pub fn new(config: LinkConfig, bus: Bus) -> Self {
        let backoff = Backoff::new(config.reconnect_base, config.reconnect_escalated);
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            config,
            http: reqwest::Client::new(),
            bus,
            backoff,
            state_tx,
            writer: Arc::default(),
        }
    }

    /// Handle for collaborators to send application envelopes through
    pub fn gateway(&self) -> Gateway {
        Gateway::new(self.state_tx.subscribe(), Arc::clone(&self.writer))
    }

    /// Observer for lifecycle transitions
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Drives the connection until the server closes the link normally.
    ///
    /// Every other way a session can end (abnormal close, socket error,
    /// stall, failed establishment) funnels into the reconnect path; nothing
    /// here is fatal.
    pub async fn run(mut self) {
        loop {
            match self.establish().await {
                Ok(socket) => {
                    self.backoff.reset();
                    self.set_state(ConnectionState::Open);
                    info!("uplink open");

                    let (write, read) = socket.split();
                    *self.writer.lock().await = Some(write);
                    self.bus.publish(Event::Opened);

                    let disconnect = self.session(read).await;

                    // Teardown before anything else: emptying the slot drops
                    // both halves, so a stale session can neither deliver nor
                    // transmit into the next one.
                    self.writer.lock().await.take();
                    self.bus.publish(Event::Closed);

                    match disconnect {
                        Disconnect::Normal => {
                            self.set_state(ConnectionState::Idle);
                            info!("server closed the link");
                            return;
                        }
                        Disconnect::Abnormal(code) => {
                            warn!(?code, "uplink closed abnormally")
                        }
                        Disconnect::Stalled => warn!(
                            "no keepalive probe within {:?}, dropping stale link",
                            self.config.stall_timeout
                        ),
                        Disconnect::Transport(error) => warn!(%error, "uplink transport error"),
                    }
                }
                Err(error) if error.is_connection_refused() => {
                    warn!("control server refused the connection");
                }
                Err(error) => warn!(%error, "failed to establish uplink"),
            }

            self.set_state(ConnectionState::Reconnecting);
            let delay = self.backoff.record_failure();
            info!(attempt = self.backoff.attempts(), "retrying in {delay:?}");
            sleep(delay).await;
        }
    }

    /// One full connection attempt: mint a fresh token, then open the
    /// transport at `<server_address>/<token>` identified by the api key.
    async fn establish(
        &self,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, EstablishError> {
        self.set_state(ConnectionState::Authenticating);
        let credentials = &self.config.credentials;
        let token = fetch_token(&self.http, credentials, self.config.auth_timeout).await?;

        self.set_state(ConnectionState::Connecting);
        let url = format!(
            "{}/{}",
            credentials.server_address.trim_end_matches('/'),
            token.as_str()
        );
        let mut request = url.into_client_request()?;
        request.headers_mut().insert(
            "sec-websocket-protocol",
            HeaderValue::from_str(&credentials.api_key)?,
        );

        let (socket, _response) = connect_async(request).await?;
        Ok(socket)
    }

    /// Reads the open session until it ends, forwarding screened text frames
    /// verbatim on the bus. WebSocket pings are the keepalive probes; each
    /// one restarts the watchdog window.
    async fn session(&self, mut read: WsReader) -> Disconnect {
        let mut watchdog = Watchdog::new(self.config.stall_timeout);
        watchdog.arm();

        let disconnect = loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match envelope::screen(&text) {
                        Ok(()) => self.bus.publish(Event::Message(text.to_string())),
                        Err(error) => warn!(%error, "discarding inbound frame"),
                    },
                    Some(Ok(Message::Ping(_))) => {
                        debug!("keepalive probe");
                        watchdog.arm();
                    }
                    // Binary frames are ignored, as are pongs
                    Some(Ok(Message::Binary(_) | Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => match frame {
                        Some(frame) if frame.code == CloseCode::Normal => break Disconnect::Normal,
                        Some(frame) => break Disconnect::Abnormal(Some(frame.code.into())),
                        None => break Disconnect::Abnormal(None),
                    },
                    Some(Err(error)) => break Disconnect::Transport(error),
                    None => break Disconnect::Abnormal(None),
                },
                _ = watchdog.expired() => break Disconnect::Stalled,
            }
        };

        watchdog.disarm();
        disconnect
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(?state, "uplink state");
        self.state_tx.send_replace(state);
    }
}
