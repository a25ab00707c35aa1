//! Value provider boundary
//!
//! The engine never reads sensors itself. It asks a [`StateLookup`] for the
//! current raw state of each input and classifies the answer.

use serde::{Deserialize, Serialize};

/// Raw state reported by an entity that is unavailable
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Raw state reported by an entity whose value is not known yet
pub const STATE_UNKNOWN: &str = "unknown";

/// Current reading of one input as seen by the value provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReading {
    /// Raw state string, `None` when the entity does not exist
    pub raw_state: Option<String>,

    /// Whether the provider considers the state usable
    pub valid: bool,
}

impl EntityReading {
    /// Reading for an entity the provider knows nothing about
    pub fn missing() -> Self {
        Self {
            raw_state: None,
            valid: false,
        }
    }

    /// Reading for an entity with a state string
    ///
    /// `unavailable` and `unknown` are flagged invalid.
    pub fn from_state(state: impl Into<String>) -> Self {
        let state = state.into();
        let valid = state != STATE_UNAVAILABLE && state != STATE_UNKNOWN;
        Self {
            raw_state: Some(state),
            valid,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.raw_state.is_none()
    }
}

/// Capability to look up the current state of an entity
pub trait StateLookup {
    fn lookup(&self, entity_id: &str) -> EntityReading;
}

impl<S: StateLookup + ?Sized> StateLookup for &S {
    fn lookup(&self, entity_id: &str) -> EntityReading {
        (**self).lookup(entity_id)
    }
}

impl<S: StateLookup + ?Sized> StateLookup for std::sync::Arc<S> {
    fn lookup(&self, entity_id: &str) -> EntityReading {
        (**self).lookup(entity_id)
    }
}

impl StateLookup for std::collections::HashMap<String, String> {
    fn lookup(&self, entity_id: &str) -> EntityReading {
        self.get(entity_id)
            .map(EntityReading::from_state)
            .unwrap_or_else(EntityReading::missing)
    }
}
