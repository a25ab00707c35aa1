//! Rule evaluation and severity aggregation for Emergency Stop
//!
//! Each tick the [`RuleEngine`] visits every rule, evaluates the ones whose
//! interval has elapsed, advances their debounce state machines and rebuilds
//! the global severity state:
//!
//! ```text
//! schedule -> collect -> aggregate -> condition -> runtime -> severity
//! ```
//!
//! The engine is synchronous and performs no I/O. Readings come from a
//! [`StateLookup`](es_core::StateLookup) passed to each tick, time from a
//! [`Clock`](es_core::Clock) read once per tick.

pub mod aggregate;
pub mod collector;
pub mod condition;
pub mod engine;
pub mod evaluate;
pub mod runtime;
pub mod schedule;
pub mod severity;

pub use aggregate::AggregateValue;
pub use collector::{Collector, InvalidReason};
pub use engine::RuleEngine;
pub use evaluate::{RuleOutcome, ScalarReading, NO_VALID_VALUES, UNSUPPORTED};
pub use runtime::{RuleRuntimeState, Transition};
pub use schedule::{deterministic_offset, tick_interval};
pub use severity::{ActiveEvent, Channel, EventValue, GlobalSeverityState, ReasonSummary};
