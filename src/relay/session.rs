//! Per-connection relay logic, independent of the transport carrying it.
//!
//! A `RelaySession` subscribes to the router before anything else happens on
//! the connection, so it receives every broadcast from its own join onward,
//! including the echo of its own messages. Dropping the session removes the
//! participant from the registry.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::router::BroadcastRouter;
use crate::protocol::{ClientFrame, ConnectionId, ServerFrame};

pub struct RelaySession {
    connection_id: ConnectionId,
    router: Arc<BroadcastRouter>,
    rx: broadcast::Receiver<ServerFrame>,
}

impl RelaySession {
    /// Open a session with a fresh connection id.
    pub fn open(router: Arc<BroadcastRouter>) -> Self {
        let rx = router.subscribe();
        let connection_id = Uuid::new_v4().simple().to_string();
        debug!("New connection: {}", connection_id);
        Self {
            connection_id,
            router,
            rx,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// First frame to send on the connection.
    pub fn welcome(&self) -> ServerFrame {
        ServerFrame::Welcome {
            connection_id: self.connection_id.clone(),
        }
    }

    /// Apply one client frame. Returns a reply meant only for this connection.
    pub fn handle(&self, frame: ClientFrame) -> Option<ServerFrame> {
        match frame {
            ClientFrame::UserJoin(join) => {
                self.router.register(
                    &self.connection_id,
                    join.display_name.as_deref(),
                    join.preferred_language.as_deref(),
                );
                None
            }
            ClientFrame::LanguageChange(change) => {
                self.router
                    .update_language(&self.connection_id, &change.preferred_language);
                None
            }
            ClientFrame::SendMessage(message) => {
                let provisional_id = message.id.clone();
                self.router.publish(message, &self.connection_id);
                Some(ServerFrame::Ack { id: provisional_id })
            }
        }
    }

    /// Parse and apply a raw text frame. Unparseable input yields a
    /// `bad_frame` error for this connection only.
    pub fn handle_text(&self, text: &str) -> Option<ServerFrame> {
        match serde_json::from_str::<ClientFrame>(text) {
            Ok(frame) => self.handle(frame),
            Err(e) => {
                warn!("{} sent an unreadable frame: {}", self.connection_id, e);
                Some(ServerFrame::error("bad_frame", e.to_string()))
            }
        }
    }

    /// Next broadcast frame for this connection; `None` once the router is gone.
    ///
    /// A receiver that fell behind gets a `lagged` error frame and continues
    /// with the oldest frame still buffered.
    pub async fn next_outbound(&mut self) -> Option<ServerFrame> {
        match self.rx.recv().await {
            Ok(frame) => Some(frame),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("{} lagged behind by {} frames", self.connection_id, missed);
                Some(ServerFrame::error(
                    "lagged",
                    format!("Missed {} events, presence will refresh on the next change", missed),
                ))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        debug!("Connection closed: {}", self.connection_id);
        self.router.remove(&self.connection_id);
    }
}
