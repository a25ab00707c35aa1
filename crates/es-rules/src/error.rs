//! Error types for rule validation and loading

use es_core::RuleIdError;
use thiserror::Error;

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Reasons a rule definition is rejected
#[derive(Debug, Error)]
pub enum RuleError {
    /// A required key is absent or empty
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    /// The rule id is not usable
    #[error("invalid rule_id: {0}")]
    InvalidId(#[from] RuleIdError),

    /// The rule has no inputs
    #[error("rule must reference at least one entity")]
    NoEntities,

    /// Data type, aggregate, condition and severity mode do not fit together
    #[error("unsupported combination: data_type={data_type} aggregate={aggregate} condition={condition} severity_mode={severity_mode}")]
    UnsupportedCombination {
        data_type: String,
        aggregate: String,
        condition: String,
        severity_mode: String,
    },

    /// The condition needs more threshold values than configured
    #[error("condition '{condition}' requires {required} threshold(s)")]
    MissingThresholds {
        condition: String,
        required: usize,
    },

    /// A threshold is not a number
    #[error("threshold '{value}' is not a number")]
    InvalidThreshold { value: String },

    /// `between` bounds are reversed
    #[error("between thresholds out of order: {low} > {high}")]
    ThresholdOrder { low: f64, high: f64 },

    /// A duration is below one second
    #[error("duration for '{scope}' must be at least 1 second, got {value}")]
    InvalidDuration { scope: String, value: i64 },

    /// The polling interval is longer than a debounce window
    #[error("interval_seconds {interval} exceeds duration_seconds {duration} of '{scope}'")]
    IntervalExceedsDuration {
        interval: u32,
        duration: u32,
        scope: String,
    },

    /// Semafor mode without any configured level
    #[error("semafor mode requires at least one configured level")]
    SemaforLevelsRequired,

    /// Semafor thresholds are not strictly monotonic in severity order
    #[error("semafor thresholds must be strictly {expected} from notify to shutdown")]
    SemaforOrder { expected: &'static str },

    /// Text rule without a usable match literal
    #[error("text rule requires a non-empty match value")]
    InvalidTextMatch,

    /// Two rules share the same id
    #[error("duplicate rule_id '{0}'")]
    DuplicateId(String),

    /// Rule entry could not be decoded
    #[error("failed to decode rule: {0}")]
    Decode(#[from] serde_json::Error),

    /// Rules document is not valid YAML
    #[error("failed to parse YAML rules: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
}
