//! Raw rule configuration
//!
//! These types mirror the keys the integration stores for each rule. They are
//! deliberately permissive; [`RuleDefinition`](crate::RuleDefinition) does
//! the validation.

use es_core::SeverityLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_RULE_DURATION: i64 = 5;
pub const DEFAULT_RULE_INTERVAL: i64 = 1;
pub const DEFAULT_RULE_LEVEL: SeverityLevel = SeverityLevel::Limit;

/// Kind of value a rule reads from its inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Numeric,
    Binary,
    Text,
}

/// Aggregate function applied across a rule's inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Min,
    Max,
    Sum,
    Avg,
    Any,
    All,
    Count,
}

/// Condition applied to the aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Between,
    IsOn,
    IsOff,
    Contains,
    Equals,
}

impl ConditionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionKind::Gt => "gt",
            ConditionKind::Gte => "gte",
            ConditionKind::Lt => "lt",
            ConditionKind::Lte => "lte",
            ConditionKind::Eq => "eq",
            ConditionKind::Between => "between",
            ConditionKind::IsOn => "is_on",
            ConditionKind::IsOff => "is_off",
            ConditionKind::Contains => "contains",
            ConditionKind::Equals => "equals",
        }
    }
}

/// Policy applied when none of a rule's inputs is readable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownHandling {
    /// Freeze the rule for this tick
    #[default]
    Ignore,
    /// Treat as a non-violation
    TreatOk,
    /// Treat as a violation
    TreatViolation,
}

/// Single-level or multi-level escalation rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SeverityMode {
    #[default]
    Simple,
    Semafor,
}

/// Which way a semafor value gets worse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsWorse,
    LowerIsWorse,
}

impl Direction {
    /// Comparator shown in detail strings
    pub fn comparator(self) -> &'static str {
        match self {
            Direction::HigherIsWorse => ">=",
            Direction::LowerIsWorse => "<=",
        }
    }
}

/// A configured threshold; text rules store their match literal here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdValue {
    Number(f64),
    Text(String),
}

impl ThresholdValue {
    /// Numeric value, parsing text thresholds such as `"3.5"`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ThresholdValue::Number(n) => Some(*n),
            ThresholdValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ThresholdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdValue::Number(n) => write!(f, "{n}"),
            ThresholdValue::Text(s) => f.write_str(s),
        }
    }
}

/// Per-level semafor configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    pub threshold: f64,
    pub duration_seconds: i64,
}

/// Raw rule configuration as stored by the integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Stable unique id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    /// Human-readable name, used as the event reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub data_type: DataType,

    /// Input entity ids, in evaluation order
    #[serde(default)]
    pub entities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregateKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionKind>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thresholds: Vec<ThresholdValue>,

    #[serde(default = "default_duration")]
    pub duration_seconds: i64,

    #[serde(default = "default_interval")]
    pub interval_seconds: i64,

    #[serde(default = "default_level")]
    pub level: SeverityLevel,

    /// Stay active until an explicit reset
    #[serde(default)]
    pub latched: bool,

    #[serde(default)]
    pub unknown_handling: UnknownHandling,

    #[serde(default)]
    pub severity_mode: SeverityMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,

    /// Semafor levels keyed by severity name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub levels: BTreeMap<SeverityLevel, LevelConfig>,

    #[serde(default)]
    pub text_case_sensitive: bool,

    #[serde(default = "default_true")]
    pub text_trim: bool,

    #[serde(default = "default_true")]
    pub notify_email: bool,

    #[serde(default = "default_true")]
    pub notify_mobile: bool,
}

fn default_duration() -> i64 {
    DEFAULT_RULE_DURATION
}

fn default_interval() -> i64 {
    DEFAULT_RULE_INTERVAL
}

fn default_level() -> SeverityLevel {
    DEFAULT_RULE_LEVEL
}

fn default_true() -> bool {
    true
}
