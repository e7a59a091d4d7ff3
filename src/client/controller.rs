//! Connection resilience: keeps one relay link alive and rejoins after
//! every reconnect.
//!
//! The controller runs a single background task that cycles through
//! `Connecting → Connected → Disconnected | Error → (delay) → Connecting`.
//! Each pass through the loop arms at most one reconnect delay, so timers
//! can never overlap. Every time a link comes up, the join handshake is
//! re-sent with the identity held at that moment.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::lifecycle::Outbound;
use super::transport::{Connector, Link, TransportEvent};
use crate::i18n::Language;
use crate::protocol::{ClientFrame, ConnectionId, JoinRequest, LanguageChange, OutboundMessage, ServerFrame};
use crate::retry::ReconnectPolicy;

/// Bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("Not connected to the relay")]
    Offline,
}

/// Who this client says it is on every join handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub preferred_language: Language,
}

impl Identity {
    fn join_frame(&self) -> ClientFrame {
        ClientFrame::UserJoin(JoinRequest {
            display_name: Some(self.display_name.clone()),
            preferred_language: Some(self.preferred_language.code().to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// A relay frame tagged with the connection that delivered it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub connection_id: ConnectionId,
    pub frame: ServerFrame,
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    /// Sender half of the live link; `Some` exactly while `Connected`
    link: Mutex<Option<(ConnectionId, mpsc::UnboundedSender<ClientFrame>)>>,
    identity: Mutex<Identity>,
    refresh: Notify,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!("Connection state: {:?} -> {:?}", previous, state);
        }
    }

    /// Install the link, go `Connected` and send the rejoin handshake.
    fn go_online(&self, connection_id: ConnectionId, outbound: mpsc::UnboundedSender<ClientFrame>) {
        // identity lock held across the handshake so a concurrent language
        // change lands either before the join or after it, never in between
        let identity = self.identity.lock();
        let mut link = self.link.lock();
        *link = Some((connection_id.clone(), outbound.clone()));
        self.set_state(ConnectionState::Connected);

        info!(
            "Joining as {:?} ({}) on {}",
            identity.display_name, identity.preferred_language, connection_id
        );
        if outbound.send(identity.join_frame()).is_err() {
            warn!("Link closed before the join handshake was sent");
        }
    }

    fn go_offline(&self, state: ConnectionState) {
        let mut link = self.link.lock();
        *link = None;
        self.set_state(state);
    }

    fn send(&self, frame: ClientFrame) -> Result<(), SendError> {
        let link = self.link.lock();
        match link.as_ref() {
            Some((_, outbound)) if self.state() == ConnectionState::Connected => {
                outbound.send(frame).map_err(|_| SendError::Offline)
            }
            _ => Err(SendError::Offline),
        }
    }
}

/// Handle to the background connection task.
///
/// Dropping the handle stops the task and closes the live link.
pub struct ConnectionController {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionController {
    /// Start connecting in the background. Relay frames are delivered on the
    /// returned receiver in arrival order.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        identity: Identity,
        options: ControllerOptions,
    ) -> (Self, mpsc::UnboundedReceiver<InboundFrame>) {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            state,
            link: Mutex::new(None),
            identity: Mutex::new(identity),
            refresh: Notify::new(),
        });
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(
            shared.clone(),
            connector,
            options,
            frames_tx,
            shutdown_rx,
        ));

        let controller = Self {
            shared,
            shutdown,
            task: Mutex::new(Some(task)),
        };
        (controller, frames_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Connection id of the live link, if any.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.shared.link.lock().as_ref().map(|(id, _)| id.clone())
    }

    pub fn identity(&self) -> Identity {
        self.shared.identity.lock().clone()
    }

    /// Send a frame on the live link. Rejected synchronously when not
    /// `Connected`; nothing is queued.
    pub fn send(&self, frame: ClientFrame) -> Result<(), SendError> {
        self.shared.send(frame)
    }

    /// Change the preferred language locally, and on the relay when connected.
    ///
    /// While offline only the local identity changes; the next rejoin
    /// handshake carries it.
    pub fn change_language(&self, language: Language) {
        let mut identity = self.shared.identity.lock();
        identity.preferred_language = language;
        match self.shared.send(ClientFrame::LanguageChange(LanguageChange {
            preferred_language: language.code().to_string(),
        })) {
            Ok(()) => debug!("Language change sent: {}", language),
            Err(SendError::Offline) => {
                debug!("Offline, language {} will be sent on rejoin", language)
            }
        }
    }

    /// Skip the pending reconnect delay, or start over once the attempt
    /// budget is spent. Returns `false` when there is nothing to skip
    /// (connected or already connecting).
    pub fn refresh(&self) -> bool {
        match self.state() {
            ConnectionState::Disconnected | ConnectionState::Error => {
                info!("Manual reconnect requested");
                self.shared.refresh.notify_one();
                true
            }
            _ => false,
        }
    }

    /// Stop reconnecting and close the live link.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Outbound for ConnectionController {
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn connection_id(&self) -> Option<ConnectionId> {
        ConnectionController::connection_id(self)
    }

    fn transmit(&self, message: OutboundMessage) -> Result<(), SendError> {
        self.send(ClientFrame::SendMessage(message))
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn run(
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    options: ControllerOptions,
    frames: mpsc::UnboundedSender<InboundFrame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);

        let attempt = tokio::select! {
            result = tokio::time::timeout(options.connect_timeout, connector.connect()) => result,
            _ = shutdown.changed() => break,
        };

        let ended_in = match attempt {
            Ok(Ok(link)) => {
                failures = 0;
                match pump(&shared, link, &frames, &mut shutdown).await {
                    Some(state) => state,
                    None => break,
                }
            }
            Ok(Err(e)) => {
                failures = failures.saturating_add(1);
                warn!("Connect attempt failed: {}", e);
                ConnectionState::Error
            }
            Err(_) => {
                failures = failures.saturating_add(1);
                warn!("Connect attempt timed out after {:?}", options.connect_timeout);
                ConnectionState::Error
            }
        };
        shared.go_offline(ended_in);

        if *shutdown.borrow() {
            break;
        }
        if !options.reconnect.allows_attempt(failures) {
            error!("Giving up after {} failed connect attempts", failures);
            // Parked until a manual reconnect starts a fresh attempt budget.
            tokio::select! {
                _ = shared.refresh.notified() => {
                    info!("Reconnecting after giving up");
                    failures = 0;
                    continue;
                }
                _ = shutdown.changed() => break,
            }
        }

        let delay = options.reconnect.delay_for_attempt(failures.max(1));
        debug!("Reconnecting in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.refresh.notified() => debug!("Reconnect delay skipped"),
            _ = shutdown.changed() => break,
        }
    }

    shared.go_offline(match shared.state() {
        ConnectionState::Connecting | ConnectionState::Connected => ConnectionState::Disconnected,
        other => other,
    });
    debug!("Connection task finished");
}

/// Drive one link until it ends. Returns the state to enter afterwards, or
/// `None` on shutdown.
async fn pump(
    shared: &Shared,
    link: Link,
    frames: &mpsc::UnboundedSender<InboundFrame>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<ConnectionState> {
    let Link {
        connection_id,
        outbound,
        mut inbound,
    } = link;
    shared.go_online(connection_id.clone(), outbound);

    loop {
        tokio::select! {
            event = inbound.recv() => match event {
                Some(TransportEvent::Frame(frame)) => {
                    let _ = frames.send(InboundFrame {
                        connection_id: connection_id.clone(),
                        frame,
                    });
                }
                Some(TransportEvent::Closed) | None => {
                    info!("Link {} closed", connection_id);
                    return Some(ConnectionState::Disconnected);
                }
                Some(TransportEvent::Failed(reason)) => {
                    warn!("Link {} failed: {}", connection_id, reason);
                    return Some(ConnectionState::Error);
                }
            },
            _ = shutdown.changed() => return None,
        }
    }
}
