//! Broadcast router: stamps inbound messages and fans every relay event out
//! to all live connections.
//!
//! The router owns the presence registry behind one mutex. Every mutation and
//! the broadcast it causes happen under that lock, so receivers observe frames
//! in exactly the order the operations were invoked and never see a
//! half-applied registry.

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::presence::{PresenceRegistry, ANONYMOUS_NAME};
use crate::i18n::Language;
use crate::protocol::{ChatMessage, OutboundMessage, Participant, ServerFrame};

/// Buffer 1024 frames; slower receivers are told they lagged.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub broadcast_capacity: usize,
    /// Keep a sender-supplied timestamp instead of stamping server time
    pub trust_client_timestamps: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            trust_client_timestamps: true,
        }
    }
}

pub struct BroadcastRouter {
    registry: Mutex<PresenceRegistry>,
    tx: broadcast::Sender<ServerFrame>,
    trust_client_timestamps: bool,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl BroadcastRouter {
    pub fn new(options: RouterOptions) -> Self {
        let (tx, _) = broadcast::channel(options.broadcast_capacity.max(1));
        Self {
            registry: Mutex::new(PresenceRegistry::new()),
            tx,
            trust_client_timestamps: options.trust_client_timestamps,
        }
    }

    /// Receive every frame broadcast from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerFrame> {
        self.tx.subscribe()
    }

    /// Join handshake: insert or replace the participant, then broadcast the
    /// full registry. Blank fields fall back to `Anonymous` / the default language.
    pub fn register(
        &self,
        connection_id: &str,
        display_name: Option<&str>,
        preferred_language: Option<&str>,
    ) {
        let display_name = non_blank(display_name).unwrap_or(ANONYMOUS_NAME);
        let language = non_blank(preferred_language).unwrap_or(Language::fallback().code());

        let mut registry = self.registry.lock();
        registry.register(connection_id, display_name, language, Utc::now());
        info!(
            "{} joined as {:?} ({}), {} online",
            connection_id,
            display_name,
            language,
            registry.len()
        );
        self.broadcast_snapshot(&registry);
    }

    /// Update a participant's language. Unknown ids are ignored; no broadcast.
    pub fn update_language(&self, connection_id: &str, language: &str) {
        let Some(language) = non_blank(Some(language)) else {
            return;
        };
        if self.registry.lock().update_language(connection_id, language) {
            info!("{} switched language to {}", connection_id, language);
        } else {
            debug!("Ignoring language change for unknown connection {}", connection_id);
        }
    }

    /// Drop a participant and broadcast the registry. No-op if already absent.
    pub fn remove(&self, connection_id: &str) {
        let mut registry = self.registry.lock();
        if registry.remove(connection_id) {
            info!("{} left, {} online", connection_id, registry.len());
            self.broadcast_snapshot(&registry);
        }
    }

    /// Stamp `message` with canonical sender fields and broadcast it to every
    /// connection, the sender included.
    ///
    /// A sender without a registry record gets an anonymous one first.
    pub fn publish(&self, message: OutboundMessage, sender_id: &str) -> ChatMessage {
        let mut registry = self.registry.lock();

        if !registry.contains(sender_id) {
            warn!("{} sent a message before joining, registering as anonymous", sender_id);
            registry.register(sender_id, ANONYMOUS_NAME, Language::fallback().code(), Utc::now());
            self.broadcast_snapshot(&registry);
        }

        let (sender_name, sender_language) = match registry.get(sender_id) {
            Some(participant) => (
                participant.display_name.clone(),
                participant.preferred_language.clone(),
            ),
            None => (ANONYMOUS_NAME.to_string(), Language::fallback().code().to_string()),
        };

        let source_language = non_blank(message.source_language.as_deref())
            .map(str::to_string)
            .unwrap_or(sender_language);

        let timestamp = match message.timestamp {
            Some(client_time) if self.trust_client_timestamps => client_time,
            _ => Utc::now(),
        };

        let stamped = ChatMessage {
            id: Uuid::new_v4().to_string(),
            provisional_id: Some(message.id),
            sender_id: sender_id.to_string(),
            sender_name,
            original_text: message.text,
            source_language,
            timestamp,
        };

        debug!("Broadcasting {} from {}", stamped.id, sender_id);
        // Send errors only mean nobody is subscribed
        let _ = self.tx.send(ServerFrame::ReceiveMessage(stamped.clone()));
        stamped
    }

    pub fn snapshot(&self) -> Vec<Participant> {
        self.registry.lock().snapshot()
    }

    pub fn participant_count(&self) -> usize {
        self.registry.lock().len()
    }

    fn broadcast_snapshot(&self, registry: &PresenceRegistry) {
        // Send errors only mean nobody is subscribed
        let _ = self.tx.send(ServerFrame::UserList {
            participants: registry.snapshot(),
        });
    }
}

impl Default for BroadcastRouter {
    fn default() -> Self {
        Self::new(RouterOptions::default())
    }
}
