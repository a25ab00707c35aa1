//! Entity state storage for the Emergency Stop engine
//!
//! This crate provides the StateStore, which holds the latest raw state of
//! every monitored entity. Integrations write into it from any task; the
//! engine reads from it through the [`StateLookup`] capability once per tick.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use es_core::{EntityReading, StateLookup};
use tracing::{debug, instrument, trace};

/// Latest known state of one entity
#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    /// Raw state value (e.g., "on", "3.71", "unavailable")
    pub state: String,

    /// Whether the writer marked the value usable
    pub valid: bool,

    /// When the value last changed
    pub last_changed: DateTime<Utc>,

    /// When the value was last written, even if unchanged
    pub last_updated: DateTime<Utc>,
}

/// The state store tracks the latest state of all entities
///
/// The StateStore is responsible for:
/// - Storing the current raw state of each entity
/// - Preserving `last_changed` when a write repeats the same value
/// - Providing thread-safe concurrent access to states
#[derive(Debug, Default)]
pub struct StateStore {
    /// All entity states keyed by entity_id string
    states: DashMap<String, StoredState>,
}

impl StateStore {
    /// Create an empty state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state of an entity
    ///
    /// `unavailable` and `unknown` are stored as invalid readings.
    pub fn set(&self, entity_id: impl Into<String>, state: impl Into<String>) -> StoredState {
        let state = state.into();
        let valid = EntityReading::from_state(state.as_str()).valid;
        self.write(entity_id.into(), state, valid)
    }

    /// Set a state explicitly flagged as unusable by its source
    pub fn set_invalid(&self, entity_id: impl Into<String>, state: impl Into<String>) -> StoredState {
        self.write(entity_id.into(), state.into(), false)
    }

    #[instrument(skip(self, state), fields(entity_id = %entity_id))]
    fn write(&self, entity_id: String, state: String, valid: bool) -> StoredState {
        let now = Utc::now();
        let mut entry = self
            .states
            .entry(entity_id)
            .or_insert_with(|| StoredState {
                state: state.clone(),
                valid,
                last_changed: now,
                last_updated: now,
            });

        let changed = entry.state != state || entry.valid != valid;
        if changed {
            entry.state = state;
            entry.valid = valid;
            entry.last_changed = now;
        }
        entry.last_updated = now;

        debug!(state = %entry.state, valid, changed, "Setting entity state");
        entry.clone()
    }

    /// Get the current state of an entity
    pub fn get(&self, entity_id: &str) -> Option<StoredState> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Remove an entity's state
    pub fn remove(&self, entity_id: &str) -> Option<StoredState> {
        let removed = self.states.remove(entity_id).map(|(_, s)| s);
        if removed.is_some() {
            trace!(entity_id, "Removed entity state");
        }
        removed
    }

    /// Get all entity IDs
    pub fn entity_ids(&self) -> Vec<String> {
        self.states.iter().map(|r| r.key().clone()).collect()
    }

    /// Get the total number of entities
    pub fn entity_count(&self) -> usize {
        self.states.len()
    }
}

impl StateLookup for StateStore {
    fn lookup(&self, entity_id: &str) -> EntityReading {
        match self.states.get(entity_id) {
            Some(stored) => EntityReading {
                raw_state: Some(stored.state.clone()),
                valid: stored.valid,
            },
            None => EntityReading::missing(),
        }
    }
}
