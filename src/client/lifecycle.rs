//! The client's ordered message log.
//!
//! Local optimistic entries and relay-confirmed entries share one log. A
//! composed message is appended as `Pending` before it is transmitted, moves
//! to `Acknowledged` when the relay acks it, and is resolved in place when its
//! broadcast echo arrives. Deletion, selection and forwarding never leave the
//! client.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use super::controller::SendError;
use crate::protocol::{ChatMessage, ConnectionId, OutboundMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeliveryState {
    /// Appended locally, not yet acknowledged by the relay
    Pending,
    /// The relay accepted our message
    Acknowledged,
    /// Received from another participant
    Delivered,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Message text is empty")]
    EmptyText,

    #[error("Not connected to the relay")]
    Offline,
}

impl From<SendError> for ComposeError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Offline => ComposeError::Offline,
        }
    }
}

/// Where composed messages go.
pub trait Outbound {
    fn is_connected(&self) -> bool;
    fn connection_id(&self) -> Option<ConnectionId>;
    fn transmit(&self, message: OutboundMessage) -> Result<(), SendError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Provisional id until the relay's echo resolves it, canonical after
    pub id: String,
    pub provisional_id: Option<String>,
    pub sender_id: ConnectionId,
    pub sender_name: String,
    pub original_text: String,
    pub source_language: String,
    pub timestamp: DateTime<Utc>,
    pub delivery_state: DeliveryState,
    pub is_mine: bool,
    /// Display projection in the reader's language, when one was resolved
    pub translation: Option<String>,
    confirmed: bool,
}

impl LogEntry {
    /// Text to render: the translation if present, else the original.
    pub fn display_text(&self) -> &str {
        self.translation.as_deref().unwrap_or(&self.original_text)
    }

    /// Whether the relay's broadcast of this entry has been seen.
    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }
}

/// Translation work produced by an append or resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub entry_id: String,
    pub text: String,
    pub source_language: String,
    pub target_language: String,
}

/// Collision-resistant provisional ids: a random per-log prefix plus a counter.
#[derive(Debug)]
struct ProvisionalIds {
    prefix: u64,
    counter: AtomicU64,
}

impl ProvisionalIds {
    fn new() -> Self {
        Self {
            prefix: rand::random(),
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{:016x}-{}", self.prefix, n)
    }
}

#[derive(Debug)]
pub struct MessageLog {
    entries: Vec<LogEntry>,
    selected: HashSet<String>,
    /// Provisional ids of own messages deleted before their echo arrived
    dismissed: HashSet<String>,
    ids: ProvisionalIds,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            selected: HashSet::new(),
            dismissed: HashSet::new(),
            ids: ProvisionalIds::new(),
        }
    }

    /// Append a `Pending` entry and transmit it.
    ///
    /// Empty text and a disconnected outbound are rejected before the log is
    /// touched. If transmission fails anyway, the entry is rolled back.
    /// Returns the provisional id.
    pub fn compose(
        &mut self,
        text: &str,
        language: &str,
        sender_name: &str,
        outbound: &dyn Outbound,
    ) -> Result<String, ComposeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ComposeError::EmptyText);
        }
        let sender_id = match outbound.connection_id() {
            Some(id) if outbound.is_connected() => id,
            _ => return Err(ComposeError::Offline),
        };

        let provisional_id = self.ids.next();
        let timestamp = Utc::now();
        self.entries.push(LogEntry {
            id: provisional_id.clone(),
            provisional_id: Some(provisional_id.clone()),
            sender_id,
            sender_name: sender_name.to_string(),
            original_text: text.to_string(),
            source_language: language.to_string(),
            timestamp,
            delivery_state: DeliveryState::Pending,
            is_mine: true,
            translation: None,
            confirmed: false,
        });

        let sent = outbound.transmit(OutboundMessage {
            id: provisional_id.clone(),
            text: text.to_string(),
            source_language: Some(language.to_string()),
            timestamp: Some(timestamp),
        });
        if let Err(e) = sent {
            self.entries.retain(|entry| entry.id != provisional_id);
            return Err(e.into());
        }

        debug!("Composed {}", provisional_id);
        Ok(provisional_id)
    }

    /// Transmission ack for a provisional id. Returns whether an entry moved.
    pub fn mark_acknowledged(&mut self, provisional_id: &str) -> bool {
        match self.entries.iter_mut().find(|entry| {
            entry.is_mine && entry.provisional_id.as_deref() == Some(provisional_id)
        }) {
            Some(entry) if entry.delivery_state == DeliveryState::Pending => {
                entry.delivery_state = DeliveryState::Acknowledged;
                true
            }
            _ => false,
        }
    }

    /// Merge a relay broadcast into the log.
    ///
    /// The echo of our own message resolves the matching optimistic entry in
    /// place; anything else is appended as `Delivered`. Returns the
    /// translation to resolve when the message's language differs from
    /// `preferred_language`.
    pub fn on_receive(
        &mut self,
        message: ChatMessage,
        local_id: &str,
        preferred_language: &str,
    ) -> Option<TranslationRequest> {
        if let Some(provisional_id) = message.provisional_id.as_deref() {
            if self.dismissed.remove(provisional_id) {
                debug!("Dropping echo of deleted message {}", provisional_id);
                return None;
            }
        }

        let entry = match self.find_echo_target(&message, local_id) {
            Some(index) => {
                let entry = &mut self.entries[index];
                debug!("Resolved own message {} as {}", entry.id, message.id);
                if self.selected.remove(&entry.id) {
                    self.selected.insert(message.id.clone());
                }
                entry.id = message.id;
                entry.sender_id = message.sender_id;
                entry.sender_name = message.sender_name;
                entry.timestamp = message.timestamp;
                entry.confirmed = true;
                if entry.delivery_state == DeliveryState::Pending {
                    entry.delivery_state = DeliveryState::Acknowledged;
                }
                &self.entries[index]
            }
            None => {
                let is_mine = message.sender_id == local_id;
                self.entries.push(LogEntry {
                    id: message.id,
                    provisional_id: message.provisional_id,
                    sender_id: message.sender_id,
                    sender_name: message.sender_name,
                    original_text: message.original_text,
                    source_language: message.source_language,
                    timestamp: message.timestamp,
                    delivery_state: if is_mine {
                        DeliveryState::Acknowledged
                    } else {
                        DeliveryState::Delivered
                    },
                    is_mine,
                    translation: None,
                    confirmed: true,
                });
                &self.entries[self.entries.len() - 1]
            }
        };

        if entry.source_language.eq_ignore_ascii_case(preferred_language)
            || entry.original_text.trim().is_empty()
        {
            return None;
        }
        Some(TranslationRequest {
            entry_id: entry.id.clone(),
            text: entry.original_text.clone(),
            source_language: entry.source_language.clone(),
            target_language: preferred_language.to_string(),
        })
    }

    fn find_echo_target(&self, message: &ChatMessage, local_id: &str) -> Option<usize> {
        let unconfirmed_mine = |entry: &&LogEntry| {
            entry.is_mine
                && !entry.confirmed
                && entry.delivery_state != DeliveryState::Delivered
                && entry.original_text == message.original_text
        };

        if let Some(provisional_id) = message.provisional_id.as_deref() {
            if let Some(index) = self
                .entries
                .iter()
                .position(|e| unconfirmed_mine(&e) && e.provisional_id.as_deref() == Some(provisional_id))
            {
                return Some(index);
            }
        }

        if message.sender_id != local_id {
            return None;
        }
        self.entries
            .iter()
            .position(|e| unconfirmed_mine(&e) && e.source_language == message.source_language)
    }

    /// Attach a resolved translation. Discarded if the entry is gone.
    pub fn attach_translation(&mut self, entry_id: &str, translation: String) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == entry_id) {
            Some(entry) => {
                entry.translation = Some(translation);
                true
            }
            None => {
                debug!("Dropping translation for deleted entry {}", entry_id);
                false
            }
        }
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&LogEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove one entry locally.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let entry = self.entries.remove(index);
        self.selected.remove(id);
        self.dismiss_echo(&entry);
        true
    }

    /// Remember an unconfirmed own entry so its echo is not appended later.
    fn dismiss_echo(&mut self, entry: &LogEntry) {
        if entry.is_mine && !entry.confirmed {
            if let Some(provisional_id) = &entry.provisional_id {
                self.dismissed.insert(provisional_id.clone());
            }
        }
    }

    /// Flip selection of an entry. Returns whether it is selected afterwards.
    pub fn toggle_selection(&mut self, id: &str) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        if self.selected.remove(id) {
            false
        } else {
            self.selected.insert(id.to_string());
            true
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Selection mode lasts while at least one entry is selected.
    pub fn selection_mode(&self) -> bool {
        !self.selected.is_empty()
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Delete every selected entry. Returns how many were removed.
    pub fn delete_selected(&mut self) -> usize {
        let before = self.entries.len();
        let selected = std::mem::take(&mut self.selected);
        let (removed, kept): (Vec<LogEntry>, Vec<LogEntry>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| selected.contains(&entry.id));
        self.entries = kept;
        for entry in &removed {
            self.dismiss_echo(entry);
        }
        before - self.entries.len()
    }

    /// Text to hand to a share target for one entry.
    pub fn forward(&self, id: &str) -> Option<String> {
        self.get(id).map(|entry| entry.display_text().to_string())
    }

    /// First entry whose displayed or original text contains `query`,
    /// ignoring case.
    pub fn search(&self, query: &str) -> Option<&LogEntry> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return None;
        }
        self.entries.iter().find(|entry| {
            entry.display_text().to_lowercase().contains(&query)
                || entry.original_text.to_lowercase().contains(&query)
        })
    }
}
