//! Presence registry: live connection → participant metadata.
//!
//! The registry is plain data. Locking and snapshot broadcasting belong to
//! the `BroadcastRouter`, which owns the only instance.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::protocol::{ConnectionId, Participant};

/// Display name given to connections that never completed a join.
pub const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    participants: HashMap<ConnectionId, Participant>,
    /// Connection ids in first-registration order, for stable snapshots
    order: Vec<ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `connection_id`.
    pub fn register(
        &mut self,
        connection_id: &str,
        display_name: &str,
        preferred_language: &str,
        joined_at: DateTime<Utc>,
    ) {
        let participant = Participant {
            connection_id: connection_id.to_string(),
            display_name: display_name.to_string(),
            preferred_language: preferred_language.to_string(),
            joined_at,
        };
        if self
            .participants
            .insert(connection_id.to_string(), participant)
            .is_none()
        {
            self.order.push(connection_id.to_string());
        }
    }

    /// Change the preferred language of an existing record.
    ///
    /// Returns `false` (and changes nothing) for unknown ids: updates racing a
    /// disconnect are expected.
    pub fn update_language(&mut self, connection_id: &str, language: &str) -> bool {
        match self.participants.get_mut(connection_id) {
            Some(participant) => {
                participant.preferred_language = language.to_string();
                true
            }
            None => false,
        }
    }

    /// Delete the record. Returns `false` if it was already absent.
    pub fn remove(&mut self, connection_id: &str) -> bool {
        if self.participants.remove(connection_id).is_none() {
            return false;
        }
        self.order.retain(|id| id != connection_id);
        true
    }

    pub fn get(&self, connection_id: &str) -> Option<&Participant> {
        self.participants.get(connection_id)
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.participants.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// All participants in first-registration order.
    pub fn snapshot(&self) -> Vec<Participant> {
        self.order
            .iter()
            .filter_map(|id| self.participants.get(id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(registry: &PresenceRegistry) -> Vec<String> {
        registry
            .snapshot()
            .into_iter()
            .map(|p| p.connection_id)
            .collect()
    }

    #[test]
    fn test_register_inserts_record() {
        let mut registry = PresenceRegistry::new();
        registry.register("c1", "Asha", "hi", Utc::now());

        let participant = registry.get("c1").expect("registered");
        assert_eq!(participant.display_name, "Asha");
        assert_eq!(participant.preferred_language, "hi");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_replaces_without_duplicating() {
        let mut registry = PresenceRegistry::new();
        registry.register("c1", "Asha", "hi", Utc::now());
        registry.register("c2", "Ben", "en", Utc::now());
        registry.register("c1", "Asha K", "ta", Utc::now());

        assert_eq!(registry.len(), 2);
        assert_eq!(ids(&registry), vec!["c1", "c2"]);
        assert_eq!(registry.get("c1").unwrap().display_name, "Asha K");
        assert_eq!(registry.get("c1").unwrap().preferred_language, "ta");
    }

    #[test]
    fn test_update_language_existing() {
        let mut registry = PresenceRegistry::new();
        registry.register("c1", "Asha", "hi", Utc::now());

        assert!(registry.update_language("c1", "bn"));
        let participant = registry.get("c1").unwrap();
        assert_eq!(participant.preferred_language, "bn");
        assert_eq!(participant.display_name, "Asha");
    }

    #[test]
    fn test_update_language_unknown_is_noop() {
        let mut registry = PresenceRegistry::new();
        assert!(!registry.update_language("ghost", "bn"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_then_remove_again() {
        let mut registry = PresenceRegistry::new();
        registry.register("c1", "Asha", "hi", Utc::now());

        assert!(registry.remove("c1"));
        assert!(!registry.contains("c1"));
        assert!(registry.snapshot().is_empty());

        assert!(!registry.remove("c1"));
        assert!(registry.snapshot().is_empty());
    }

    proptest! {
        #[test]
        fn prop_remove_excludes_id_and_is_idempotent(
            others in proptest::collection::vec("[a-z]{1,6}", 0..8),
            target in "[A-Z]{1,6}",
        ) {
            let mut registry = PresenceRegistry::new();
            for id in &others {
                registry.register(id, "n", "en", Utc::now());
            }
            registry.register(&target, "t", "hi", Utc::now());

            registry.remove(&target);
            let after_first = registry.snapshot();
            registry.remove(&target);
            let after_second = registry.snapshot();

            prop_assert!(after_first.iter().all(|p| p.connection_id != target));
            prop_assert_eq!(after_first, after_second);
        }
    }
}
