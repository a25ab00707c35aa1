//! Validated rule shapes
//!
//! Each [`RuleShape`] variant carries exactly the fields its evaluation path
//! needs. Conditions embed their thresholds, so a numeric rule without a
//! threshold cannot be constructed.

use es_core::{LevelMap, SeverityLevel};
use serde::Serialize;
use std::borrow::Cow;

use crate::config::{AggregateKind, ConditionKind, DataType, Direction, ThresholdValue};
use crate::error::{RuleError, RuleResult};

/// Numeric aggregate over valid inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericAggregate {
    Min,
    Max,
    Sum,
    Avg,
}

impl NumericAggregate {
    pub fn as_str(self) -> &'static str {
        match self {
            NumericAggregate::Min => "min",
            NumericAggregate::Max => "max",
            NumericAggregate::Sum => "sum",
            NumericAggregate::Avg => "avg",
        }
    }

    pub(crate) fn from_kind(kind: AggregateKind) -> Option<Self> {
        match kind {
            AggregateKind::Min => Some(NumericAggregate::Min),
            AggregateKind::Max => Some(NumericAggregate::Max),
            AggregateKind::Sum => Some(NumericAggregate::Sum),
            AggregateKind::Avg => Some(NumericAggregate::Avg),
            _ => None,
        }
    }

    pub(crate) fn kind(self) -> AggregateKind {
        match self {
            NumericAggregate::Min => AggregateKind::Min,
            NumericAggregate::Max => AggregateKind::Max,
            NumericAggregate::Sum => AggregateKind::Sum,
            NumericAggregate::Avg => AggregateKind::Avg,
        }
    }
}

/// Numeric comparison with its thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum NumericCondition {
    Gt { threshold: f64 },
    Gte { threshold: f64 },
    Lt { threshold: f64 },
    Lte { threshold: f64 },
    Eq { threshold: f64 },
    /// Inclusive on both ends
    Between { low: f64, high: f64 },
}

impl NumericCondition {
    /// Build from a condition kind and the configured thresholds
    pub fn from_parts(kind: ConditionKind, thresholds: &[ThresholdValue]) -> RuleResult<Self> {
        let required = if kind == ConditionKind::Between { 2 } else { 1 };
        if thresholds.len() < required {
            return Err(RuleError::MissingThresholds {
                condition: kind.as_str().to_string(),
                required,
            });
        }
        let number = |value: &ThresholdValue| {
            value.as_f64().ok_or_else(|| RuleError::InvalidThreshold {
                value: value.to_string(),
            })
        };
        let threshold = number(&thresholds[0])?;

        let condition = match kind {
            ConditionKind::Gt => NumericCondition::Gt { threshold },
            ConditionKind::Gte => NumericCondition::Gte { threshold },
            ConditionKind::Lt => NumericCondition::Lt { threshold },
            ConditionKind::Lte => NumericCondition::Lte { threshold },
            ConditionKind::Eq => NumericCondition::Eq { threshold },
            ConditionKind::Between => {
                let high = number(&thresholds[1])?;
                if threshold > high {
                    return Err(RuleError::ThresholdOrder {
                        low: threshold,
                        high,
                    });
                }
                NumericCondition::Between {
                    low: threshold,
                    high,
                }
            }
            other => {
                return Err(RuleError::UnsupportedCombination {
                    data_type: "numeric".to_string(),
                    aggregate: "-".to_string(),
                    condition: other.as_str().to_string(),
                    severity_mode: "simple".to_string(),
                })
            }
        };
        Ok(condition)
    }

    pub fn matches(&self, value: f64) -> bool {
        match *self {
            NumericCondition::Gt { threshold } => value > threshold,
            NumericCondition::Gte { threshold } => value >= threshold,
            NumericCondition::Lt { threshold } => value < threshold,
            NumericCondition::Lte { threshold } => value <= threshold,
            NumericCondition::Eq { threshold } => value == threshold,
            NumericCondition::Between { low, high } => low <= value && value <= high,
        }
    }

    pub fn kind(&self) -> ConditionKind {
        match self {
            NumericCondition::Gt { .. } => ConditionKind::Gt,
            NumericCondition::Gte { .. } => ConditionKind::Gte,
            NumericCondition::Lt { .. } => ConditionKind::Lt,
            NumericCondition::Lte { .. } => ConditionKind::Lte,
            NumericCondition::Eq { .. } => ConditionKind::Eq,
            NumericCondition::Between { .. } => ConditionKind::Between,
        }
    }

    pub fn thresholds(&self) -> Vec<f64> {
        match *self {
            NumericCondition::Gt { threshold }
            | NumericCondition::Gte { threshold }
            | NumericCondition::Lt { threshold }
            | NumericCondition::Lte { threshold }
            | NumericCondition::Eq { threshold } => vec![threshold],
            NumericCondition::Between { low, high } => vec![low, high],
        }
    }

    /// Short text such as `gt 3.5` or `between 3..4`
    pub fn describe(&self) -> String {
        match *self {
            NumericCondition::Between { low, high } => format!("between {low}..{high}"),
            _ => format!("{} {}", self.kind().as_str(), self.thresholds()[0]),
        }
    }
}

/// Whether any or every valid input has to match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
    Any,
    All,
}

impl Quantifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Quantifier::Any => "any",
            Quantifier::All => "all",
        }
    }

    pub(crate) fn from_kind(kind: AggregateKind) -> Option<Self> {
        match kind {
            AggregateKind::Any => Some(Quantifier::Any),
            AggregateKind::All => Some(Quantifier::All),
            _ => None,
        }
    }

    pub(crate) fn kind(self) -> AggregateKind {
        match self {
            Quantifier::Any => AggregateKind::Any,
            Quantifier::All => AggregateKind::All,
        }
    }
}

/// State a binary rule looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryTarget {
    On,
    Off,
}

impl BinaryTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryTarget::On => "on",
            BinaryTarget::Off => "off",
        }
    }

    pub(crate) fn condition(self) -> ConditionKind {
        match self {
            BinaryTarget::On => ConditionKind::IsOn,
            BinaryTarget::Off => ConditionKind::IsOff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCondition {
    Contains,
    Equals,
}

impl TextCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            TextCondition::Contains => "contains",
            TextCondition::Equals => "equals",
        }
    }
}

/// Text comparison with its normalization policy
///
/// Trimming and case folding apply to both the configured literal and every
/// candidate value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMatcher {
    pub condition: TextCondition,
    /// Literal as configured
    pub pattern: String,
    pub case_sensitive: bool,
    pub trim: bool,
    #[serde(skip)]
    needle: String,
}

impl TextMatcher {
    pub fn new(
        condition: TextCondition,
        pattern: impl Into<String>,
        case_sensitive: bool,
        trim: bool,
    ) -> RuleResult<Self> {
        let pattern = pattern.into();
        let needle = normalize(&pattern, case_sensitive, trim).into_owned();
        if needle.is_empty() {
            return Err(RuleError::InvalidTextMatch);
        }
        Ok(Self {
            condition,
            pattern,
            case_sensitive,
            trim,
            needle,
        })
    }

    /// Literal after normalization
    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn normalize<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        normalize(raw, self.case_sensitive, self.trim)
    }

    pub fn matches(&self, raw: &str) -> bool {
        let candidate = self.normalize(raw);
        match self.condition {
            TextCondition::Contains => candidate.contains(self.needle.as_str()),
            TextCondition::Equals => candidate == self.needle.as_str(),
        }
    }

    pub(crate) fn condition_kind(&self) -> ConditionKind {
        match self.condition {
            TextCondition::Contains => ConditionKind::Contains,
            TextCondition::Equals => ConditionKind::Equals,
        }
    }
}

fn normalize(raw: &str, case_sensitive: bool, trim: bool) -> Cow<'_, str> {
    let trimmed = if trim { raw.trim() } else { raw };
    if case_sensitive {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(trimmed.to_lowercase())
    }
}

/// Debounce window and severity of a single-level rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimpleTrigger {
    pub duration_seconds: u32,
    pub level: SeverityLevel,
}

/// Threshold and debounce window of one semafor level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelSpec {
    pub threshold: f64,
    pub duration_seconds: u32,
}

/// Multi-level escalation thresholds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemaforLadder {
    pub direction: Direction,
    pub levels: LevelMap<Option<LevelSpec>>,
}

impl SemaforLadder {
    /// Direction-aware comparison of a value against one level's threshold
    pub fn level_matches(&self, spec: &LevelSpec, value: f64) -> bool {
        match self.direction {
            Direction::HigherIsWorse => value >= spec.threshold,
            Direction::LowerIsWorse => value <= spec.threshold,
        }
    }

    /// Configured levels in ascending severity order
    pub fn configured(&self) -> impl Iterator<Item = (SeverityLevel, &LevelSpec)> {
        self.levels.configured()
    }
}

/// Closed set of supported rule shapes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RuleShape {
    /// Numeric aggregate compared against a condition
    NumericSimple {
        aggregate: NumericAggregate,
        condition: NumericCondition,
        trigger: SimpleTrigger,
    },

    /// Numeric aggregate mapped onto escalation levels
    NumericSemafor {
        aggregate: NumericAggregate,
        ladder: SemaforLadder,
    },

    /// Binary inputs matched against `on`/`off`
    BinaryState {
        quantifier: Quantifier,
        target: BinaryTarget,
        trigger: SimpleTrigger,
    },

    /// Number of `on` inputs compared against a condition
    BinaryCount {
        condition: NumericCondition,
        trigger: SimpleTrigger,
    },

    /// Number of `on` inputs mapped onto escalation levels
    BinaryCountSemafor { ladder: SemaforLadder },

    /// Text inputs matched against a literal
    TextMatch {
        quantifier: Quantifier,
        matcher: TextMatcher,
        trigger: SimpleTrigger,
    },
}

impl RuleShape {
    pub fn data_type(&self) -> DataType {
        match self {
            RuleShape::NumericSimple { .. } | RuleShape::NumericSemafor { .. } => {
                DataType::Numeric
            }
            RuleShape::BinaryState { .. }
            | RuleShape::BinaryCount { .. }
            | RuleShape::BinaryCountSemafor { .. } => DataType::Binary,
            RuleShape::TextMatch { .. } => DataType::Text,
        }
    }

    /// Debounce settings of single-level shapes
    pub fn trigger(&self) -> Option<&SimpleTrigger> {
        match self {
            RuleShape::NumericSimple { trigger, .. }
            | RuleShape::BinaryState { trigger, .. }
            | RuleShape::BinaryCount { trigger, .. }
            | RuleShape::TextMatch { trigger, .. } => Some(trigger),
            RuleShape::NumericSemafor { .. } | RuleShape::BinaryCountSemafor { .. } => None,
        }
    }

    /// Escalation ladder of semafor shapes
    pub fn ladder(&self) -> Option<&SemaforLadder> {
        match self {
            RuleShape::NumericSemafor { ladder, .. } | RuleShape::BinaryCountSemafor { ladder } => {
                Some(ladder)
            }
            _ => None,
        }
    }

    pub fn is_semafor(&self) -> bool {
        self.ladder().is_some()
    }
}
