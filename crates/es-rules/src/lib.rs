//! Rule definitions for Emergency Stop
//!
//! Rules arrive as loosely-typed configuration ([`RuleConfig`], the shape
//! stored by the integration) and are validated into immutable
//! [`RuleDefinition`]s whose [`RuleShape`] only carries the fields relevant
//! to that kind of rule. Illegal combinations (semafor mode on a text rule, a
//! `between` condition with one threshold, ...) are rejected at load time and
//! never reach the engine.
//!
//! # Key Types
//!
//! - [`RuleConfig`] - Raw per-rule configuration
//! - [`RuleDefinition`] - Validated rule
//! - [`RuleShape`] - Closed set of supported rule shapes
//! - [`RuleSet`] - Loaded rules, with per-rule rejection

pub mod config;
pub mod error;
pub mod loader;
pub mod rule;
pub mod shape;

pub use config::{
    AggregateKind, ConditionKind, DataType, Direction, LevelConfig, RuleConfig, SeverityMode,
    ThresholdValue, UnknownHandling,
};
pub use error::{RuleError, RuleResult};
pub use loader::{RejectedRule, RuleSet, RulesExport, RULES_EXPORT_VERSION};
pub use rule::{NotifyChannels, RuleDefinition};
pub use shape::{
    BinaryTarget, LevelSpec, NumericAggregate, NumericCondition, Quantifier, RuleShape,
    SemaforLadder, SimpleTrigger, TextCondition, TextMatcher,
};
