//! Core types for Emergency Stop
//!
//! This crate provides the fundamental types shared by the rule engine and
//! the surrounding coordinator: severity levels, rule identifiers, the value
//! provider boundary (`StateLookup`) and the clock provider boundary (`Clock`).

mod clock;
mod level;
mod reading;
mod rule_id;

pub use clock::{Clock, ManualClock, SystemClock, Tick};
pub use level::{LevelMap, SeverityLevel, LEVEL_NORMAL};
pub use reading::{EntityReading, StateLookup, STATE_UNAVAILABLE, STATE_UNKNOWN};
pub use rule_id::{RuleId, RuleIdError};
