//! Transport links between a chat client and the relay.
//!
//! A [`Connector`] produces one [`Link`] per successful connect: a sender for
//! client frames and a receiver of relay frames terminated by exactly one
//! `Closed` or `Failed` event. The connection controller owns at most one
//! link at a time and never looks below this interface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::protocol::{ClientFrame, ConnectionId, ServerFrame};
use crate::relay::{BroadcastRouter, RelaySession};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Link closed before the handshake completed")]
    Closed,
}

/// What a live link reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Frame(ServerFrame),
    /// Orderly close by either side
    Closed,
    /// Transport-level error; the link is dead
    Failed(String),
}

/// One established connection.
pub struct Link {
    pub connection_id: ConnectionId,
    pub outbound: mpsc::UnboundedSender<ClientFrame>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a link. Resolves once the relay has assigned a connection id.
    async fn connect(&self) -> Result<Link, TransportError>;
}

/// WebSocket connector for a remote relay.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut writer, mut reader) = stream.split();

        // The relay's first frame carries our identity
        let connection_id = loop {
            match reader.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerFrame>(&text) {
                    Ok(ServerFrame::Welcome { connection_id }) => break connection_id,
                    Ok(other) => debug!("Skipping pre-welcome frame: {:?}", other),
                    Err(e) => return Err(TransportError::Handshake(e.to_string())),
                },
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError::Handshake(e.to_string())),
            }
        };
        debug!("Connected to {} as {}", self.url, connection_id);

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        // Writer: runs until the owner drops its sender, then closes the socket
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to encode frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = writer.send(Message::Text(json)).await {
                    debug!("Socket write failed: {}", e);
                    return;
                }
            }
            let _ = writer.close().await;
        });

        // Reader: forwards frames, then reports how the socket ended
        tokio::spawn(async move {
            let end = loop {
                match reader.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(frame) => {
                                if in_tx.send(TransportEvent::Frame(frame)).is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!("Ignoring unreadable relay frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break TransportEvent::Closed,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break TransportEvent::Failed(e.to_string()),
                }
            };
            let _ = in_tx.send(end);
        });

        Ok(Link {
            connection_id,
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Connector bound directly to a `BroadcastRouter` in the same process.
///
/// Each link drives a `RelaySession` on its own task, exactly as the
/// WebSocket handler does. Links can be severed and new connects refused,
/// which makes drop-and-reconnect behaviour reproducible.
pub struct InProcessConnector {
    router: Arc<BroadcastRouter>,
    available: AtomicBool,
    sever: broadcast::Sender<()>,
}

impl InProcessConnector {
    pub fn new(router: Arc<BroadcastRouter>) -> Self {
        let (sever, _) = broadcast::channel(1);
        Self {
            router,
            available: AtomicBool::new(true),
            sever,
        }
    }

    /// Close every live link as if the network dropped.
    pub fn sever_all(&self) {
        let _ = self.sever.send(());
    }

    /// Accept or refuse subsequent connects.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("relay unavailable".to_string()));
        }

        let mut session = RelaySession::open(self.router.clone());
        let connection_id = session.connection_id().to_string();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let mut sever = self.sever.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = session.next_outbound() => match outbound {
                        Some(frame) => {
                            if in_tx.send(TransportEvent::Frame(frame)).is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = in_tx.send(TransportEvent::Closed);
                            break;
                        }
                    },

                    inbound = out_rx.recv() => match inbound {
                        Some(frame) => {
                            if let Some(reply) = session.handle(frame) {
                                if in_tx.send(TransportEvent::Frame(reply)).is_err() {
                                    break;
                                }
                            }
                        }
                        None => break,
                    },

                    _ = sever.recv() => {
                        let _ = in_tx.send(TransportEvent::Closed);
                        break;
                    }
                }
            }
            // session drop deregisters the participant
        });

        Ok(Link {
            connection_id,
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
