//! `ChatClient`: the presentation-facing side of a chat participant.
//!
//! Relay frames are applied to the log as they arrive. Translations resolve
//! on their own tasks, so an entry renders with its original text first and
//! is upgraded in place once the cache answers.

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::controller::{
    ConnectionController, ConnectionState, ControllerOptions, Identity, InboundFrame,
};
use super::lifecycle::{ComposeError, LogEntry, MessageLog, TranslationRequest};
use super::transport::{Connector, WsConnector};
use crate::config::ClientConfig;
use crate::i18n::{Language, MetricsReport};
use crate::protocol::{ConnectionId, Participant, ServerFrame};
use crate::translation::{GoogleTranslateLookup, TranslationCache};

/// Change notifications for a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientUpdate {
    Log,
    Participants,
    /// A relay-side problem worth showing, e.g. a lagged connection
    Notice(String),
}

pub struct ChatClient {
    controller: Arc<ConnectionController>,
    log: Arc<Mutex<MessageLog>>,
    participants: Arc<Mutex<Vec<Participant>>>,
    cache: Arc<TranslationCache>,
    updates: broadcast::Sender<ClientUpdate>,
    pump: JoinHandle<()>,
}

impl ChatClient {
    /// Start a client over any connector. Connecting happens in the background.
    pub fn start(
        connector: Arc<dyn Connector>,
        identity: Identity,
        cache: Arc<TranslationCache>,
        options: ControllerOptions,
    ) -> Self {
        let (controller, frames) = ConnectionController::spawn(connector, identity, options);
        let controller = Arc::new(controller);
        let log = Arc::new(Mutex::new(MessageLog::new()));
        let participants = Arc::new(Mutex::new(Vec::new()));
        let (updates, _) = broadcast::channel(256);

        let pump = tokio::spawn(pump(
            frames,
            controller.clone(),
            log.clone(),
            participants.clone(),
            cache.clone(),
            updates.clone(),
        ));

        Self {
            controller,
            log,
            participants,
            cache,
            updates,
            pump,
        }
    }

    /// WebSocket client with the HTTP translation lookup, as configured.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let lookup = GoogleTranslateLookup::new(&config.translate_api_url, config.translate_timeout)
            .context("Failed to build translation client")?;
        let cache = Arc::new(TranslationCache::with_capacity(
            Arc::new(lookup),
            config.translation_cache_capacity,
        ));
        let identity = Identity {
            display_name: config.display_name.clone(),
            preferred_language: config.language,
        };

        Ok(Self::start(
            Arc::new(WsConnector::new(&config.relay_url)),
            identity,
            cache,
            config.controller_options(),
        ))
    }

    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.controller.subscribe_state()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.controller.connection_id()
    }

    pub fn identity(&self) -> Identity {
        self.controller.identity()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientUpdate> {
        self.updates.subscribe()
    }

    /// Compose and send a message in the current preferred language.
    pub fn compose(&self, text: &str) -> Result<String, ComposeError> {
        let identity = self.controller.identity();
        let id = self.log.lock().compose(
            text,
            identity.preferred_language.code(),
            &identity.display_name,
            self.controller.as_ref(),
        )?;
        self.notify(ClientUpdate::Log);
        Ok(id)
    }

    pub fn change_language(&self, language: Language) {
        self.controller.change_language(language);
    }

    /// Skip the pending reconnect delay, if any.
    pub fn refresh(&self) -> bool {
        self.controller.refresh()
    }

    /// Snapshot of the log in display order.
    pub fn log(&self) -> Vec<LogEntry> {
        self.log.lock().entries().to_vec()
    }

    /// Latest presence snapshot pushed by the relay.
    pub fn participants(&self) -> Vec<Participant> {
        self.participants.lock().clone()
    }

    pub fn delete(&self, id: &str) -> bool {
        let deleted = self.log.lock().delete(id);
        if deleted {
            self.notify(ClientUpdate::Log);
        }
        deleted
    }

    pub fn toggle_selection(&self, id: &str) -> bool {
        self.log.lock().toggle_selection(id)
    }

    pub fn selection_mode(&self) -> bool {
        self.log.lock().selection_mode()
    }

    pub fn clear_selection(&self) {
        self.log.lock().clear_selection();
    }

    pub fn delete_selected(&self) -> usize {
        let removed = self.log.lock().delete_selected();
        if removed > 0 {
            self.notify(ClientUpdate::Log);
        }
        removed
    }

    pub fn forward(&self, id: &str) -> Option<String> {
        self.log.lock().forward(id)
    }

    pub fn search(&self, query: &str) -> Option<LogEntry> {
        self.log.lock().search(query).cloned()
    }

    pub fn translation_metrics(&self) -> MetricsReport {
        self.cache.metrics().report()
    }

    /// Stop reconnecting, leave the relay and stop applying frames.
    pub async fn shutdown(&self) {
        self.controller.shutdown().await;
        self.pump.abort();
    }

    fn notify(&self, update: ClientUpdate) {
        let _ = self.updates.send(update);
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        // releases the pump's controller handle, which stops the connection task
        self.pump.abort();
    }
}

async fn pump(
    mut frames: mpsc::UnboundedReceiver<InboundFrame>,
    controller: Arc<ConnectionController>,
    log: Arc<Mutex<MessageLog>>,
    participants: Arc<Mutex<Vec<Participant>>>,
    cache: Arc<TranslationCache>,
    updates: broadcast::Sender<ClientUpdate>,
) {
    while let Some(InboundFrame {
        connection_id,
        frame,
    }) = frames.recv().await
    {
        match frame {
            ServerFrame::ReceiveMessage(message) => {
                let preferred = controller.identity().preferred_language;
                let request = log
                    .lock()
                    .on_receive(message, &connection_id, preferred.code());
                let _ = updates.send(ClientUpdate::Log);

                if let Some(request) = request {
                    tokio::spawn(resolve_translation(
                        request,
                        cache.clone(),
                        log.clone(),
                        updates.clone(),
                    ));
                }
            }
            ServerFrame::Ack { id } => {
                if log.lock().mark_acknowledged(&id) {
                    let _ = updates.send(ClientUpdate::Log);
                }
            }
            ServerFrame::UserList {
                participants: snapshot,
            } => {
                debug!("Presence snapshot: {} online", snapshot.len());
                *participants.lock() = snapshot;
                let _ = updates.send(ClientUpdate::Participants);
            }
            ServerFrame::Welcome { connection_id } => {
                debug!("Relay welcomed {}", connection_id);
            }
            ServerFrame::Error { code, message } => {
                warn!("Relay reported {}: {}", code, message);
                let _ = updates.send(ClientUpdate::Notice(message));
            }
        }
    }
}

async fn resolve_translation(
    request: TranslationRequest,
    cache: Arc<TranslationCache>,
    log: Arc<Mutex<MessageLog>>,
    updates: broadcast::Sender<ClientUpdate>,
) {
    let translated = cache
        .translate(
            &request.text,
            &request.source_language,
            &request.target_language,
        )
        .await;

    // passthrough means the lookup failed; the original is already showing
    if translated == request.text {
        return;
    }
    if log.lock().attach_translation(&request.entry_id, translated) {
        let _ = updates.send(ClientUpdate::Log);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::InProcessConnector;
    use crate::relay::BroadcastRouter;
    use crate::retry::ReconnectPolicy;
    use crate::translation::{LookupError, TranslationLookup};
    use async_trait::async_trait;
    use std::time::Duration;

    struct SuffixLookup;

    #[async_trait]
    impl TranslationLookup for SuffixLookup {
        async fn lookup(&self, text: &str, _source: &str, target: &str) -> Result<String, LookupError> {
            Ok(format!("{} [{}]", text, target))
        }
    }

    fn client(router: &Arc<BroadcastRouter>, name: &str, language: Language) -> ChatClient {
        ChatClient::start(
            Arc::new(InProcessConnector::new(router.clone())),
            Identity {
                display_name: name.to_string(),
                preferred_language: language,
            },
            Arc::new(TranslationCache::new(Arc::new(SuffixLookup))),
            ControllerOptions {
                connect_timeout: Duration::from_millis(200),
                reconnect: ReconnectPolicy::fixed(Duration::from_millis(20)),
            },
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_participants_follow_presence() {
        let router = Arc::new(BroadcastRouter::default());
        let asha = client(&router, "Asha", Language::ENGLISH);
        wait_until(|| asha.participants().len() == 1).await;

        let ravi = client(&router, "Ravi", Language::HINDI);
        wait_until(|| asha.participants().len() == 2).await;

        ravi.shutdown().await;
        wait_until(|| asha.participants().len() == 1).await;
        assert_eq!(asha.participants()[0].display_name, "Asha");
    }

    #[tokio::test]
    async fn test_compose_offline_is_rejected() {
        let router = Arc::new(BroadcastRouter::default());
        let connector = Arc::new(InProcessConnector::new(router.clone()));
        connector.set_available(false);
        let asha = ChatClient::start(
            connector,
            Identity {
                display_name: "Asha".to_string(),
                preferred_language: Language::ENGLISH,
            },
            Arc::new(TranslationCache::new(Arc::new(SuffixLookup))),
            ControllerOptions::default(),
        );

        assert_eq!(asha.compose("Hello"), Err(ComposeError::Offline));
        assert!(asha.log().is_empty());
    }

    #[tokio::test]
    async fn test_received_message_gains_translation() {
        let router = Arc::new(BroadcastRouter::default());
        let asha = client(&router, "Asha", Language::ENGLISH);
        let ravi = client(&router, "Ravi", Language::HINDI);
        wait_until(|| asha.participants().len() == 2 && ravi.participants().len() == 2).await;

        asha.compose("Hello").unwrap();

        wait_until(|| {
            ravi.log()
                .first()
                .map(|entry| entry.translation.is_some())
                .unwrap_or(false)
        })
        .await;
        let entry = &ravi.log()[0];
        assert_eq!(entry.original_text, "Hello");
        assert_eq!(entry.display_text(), "Hello [hi]");
        assert_eq!(ravi.translation_metrics().lookups, 1);
    }

    #[tokio::test]
    async fn test_updates_are_published() {
        let router = Arc::new(BroadcastRouter::default());
        let asha = client(&router, "Asha", Language::ENGLISH);
        let mut updates = asha.subscribe();

        let first = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, ClientUpdate::Participants);
    }
}
