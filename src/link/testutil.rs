//! In-process WebSocket server double for link tests. Captures the handshake
//! path and subprotocol, echoes the subprotocol back (as the production
//! server does), and lets tests script frames on the accepted session.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

pub(crate) struct WsHarness {
    url: String,
    sessions: mpsc::UnboundedReceiver<ServerSession>,
}

impl WsHarness {
    /// Binds an ephemeral port and starts accepting connections
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let session_tx = session_tx.clone();
                tokio::spawn(async move {
                    if let Some(session) = ServerSession::accept(stream).await {
                        let _ = session_tx.send(session);
                    }
                });
            }
        });

        Self { url, sessions }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the next completed handshake
    pub(crate) async fn accept(&mut self) -> ServerSession {
        tokio::time::timeout(Duration::from_secs(5), self.sessions.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("harness accept loop ended")
    }
}

/// One accepted connection, with the handshake details the client offered
pub(crate) struct ServerSession {
    pub(crate) path: String,
    pub(crate) protocol: Option<String>,
    socket: WebSocketStream<TcpStream>,
}

impl ServerSession {
    async fn accept(stream: TcpStream) -> Option<Self> {
        let (meta_tx, meta_rx) = oneshot::channel();
        let callback = |request: &Request, mut response: Response| {
            let path = request.uri().path().to_string();
            let protocol = request
                .headers()
                .get("sec-websocket-protocol")
                .and_then(|value| value.to_str().ok())
                .map(String::from);
            if let Some(protocol) = &protocol {
                response
                    .headers_mut()
                    .insert("sec-websocket-protocol", protocol.parse().unwrap());
            }
            let _ = meta_tx.send((path, protocol));
            Ok(response)
        };

        let socket = accept_hdr_async(stream, callback).await.ok()?;
        let (path, protocol) = meta_rx.await.ok()?;
        Some(Self {
            path,
            protocol,
            socket,
        })
    }

    pub(crate) async fn send_text(&mut self, text: &str) {
        self.socket
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    pub(crate) async fn send_binary(&mut self, payload: &[u8]) {
        self.socket
            .send(Message::Binary(Bytes::copy_from_slice(payload)))
            .await
            .unwrap();
    }

    /// Sends a keepalive probe
    pub(crate) async fn ping(&mut self) {
        self.socket.send(Message::Ping(Bytes::new())).await.unwrap();
    }

    /// Initiates a close handshake with the given code
    pub(crate) async fn close(mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        let _ = self.socket.close(Some(frame)).await;
        // Drain until the peer acknowledges or drops
        while self.socket.next().await.is_some() {}
    }

    /// Drops the connection without a close handshake
    pub(crate) fn abort(self) {
        drop(self);
    }

    /// Waits for the next inbound text frame, skipping control frames
    pub(crate) async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Like [`next_text`](Self::next_text) but gives up after `wait`
    pub(crate) async fn try_next_text(&mut self, wait: Duration) -> Option<String> {
        tokio::time::timeout(wait, self.next_text()).await.ok()?
    }
}
