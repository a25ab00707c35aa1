//! Per-shape evaluation of one rule against current readings

use es_core::StateLookup;
use es_rules::{RuleDefinition, RuleShape};
use tracing::{error, trace};

use crate::aggregate::{aggregate_numeric, count_on, AggregateValue};
use crate::collector::{parse_binary, parse_numeric, parse_text, Collector};
use crate::condition::{quantify, unknown_match};

/// Rule-level invalid reason when no input could be read
pub const NO_VALID_VALUES: &str = "no_valid_values";

/// Rule-level invalid reason when the rule shape does not fit the mode
pub const UNSUPPORTED: &str = "unsupported";

/// Result of evaluating a single-level rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    /// `None` when the rule must not change state this tick
    pub matched: Option<bool>,
    pub aggregate: Option<AggregateValue>,
    pub entity_id: Option<String>,
    pub detail: String,
    pub invalid_reason: Option<&'static str>,
}

impl RuleOutcome {
    fn unknown(rule: &RuleDefinition, reason: &'static str) -> Self {
        Self {
            matched: unknown_match(rule.unknown_handling),
            aggregate: None,
            entity_id: None,
            detail: format!("{}: {}", rule.name, reason),
            invalid_reason: Some(reason),
        }
    }
}

/// Scalar reading of an escalation rule: the value and its attributed entity
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarReading {
    pub value: AggregateValue,
    pub entity_id: Option<String>,
}

/// Evaluate a single-level rule
pub fn evaluate_simple(
    rule: &RuleDefinition,
    collector: &mut Collector,
    lookup: &dyn StateLookup,
) -> RuleOutcome {
    let outcome = match &rule.shape {
        RuleShape::NumericSimple {
            aggregate,
            condition,
            ..
        } => {
            let values = collector.collect(rule, lookup, parse_numeric);
            if values.is_empty() {
                return RuleOutcome::unknown(rule, NO_VALID_VALUES);
            }
            let (value, entity_id) = aggregate_numeric(&values, *aggregate);
            RuleOutcome {
                matched: Some(condition.matches(value)),
                aggregate: Some(AggregateValue::Number(value)),
                entity_id: entity_id.map(str::to_string),
                detail: format!(
                    "{}: {}={:.3} {}",
                    rule.name,
                    aggregate.as_str(),
                    value,
                    condition.describe()
                ),
                invalid_reason: None,
            }
        }
        RuleShape::BinaryCount { condition, .. } => {
            let values = collector.collect(rule, lookup, parse_binary);
            if values.is_empty() {
                return RuleOutcome::unknown(rule, NO_VALID_VALUES);
            }
            let count = count_on(&values);
            RuleOutcome {
                matched: Some(condition.matches(count as f64)),
                aggregate: Some(AggregateValue::Count(count)),
                entity_id: None,
                detail: format!("{}: count={} {}", rule.name, count, condition.describe()),
                invalid_reason: None,
            }
        }
        RuleShape::BinaryState {
            quantifier, target, ..
        } => {
            let values = collector.collect(rule, lookup, parse_binary);
            if values.is_empty() {
                return RuleOutcome::unknown(rule, NO_VALID_VALUES);
            }
            let want_on = matches!(target, es_rules::BinaryTarget::On);
            let result = quantify(*quantifier, &values, |on| *on == want_on);
            RuleOutcome {
                matched: Some(result.matched),
                aggregate: None,
                entity_id: result.entity_id,
                detail: format!(
                    "{}: {} is {}",
                    rule.name,
                    quantifier.as_str(),
                    target.as_str()
                ),
                invalid_reason: None,
            }
        }
        RuleShape::TextMatch {
            quantifier,
            matcher,
            ..
        } => {
            let values = collector.collect(rule, lookup, parse_text);
            if values.is_empty() {
                return RuleOutcome::unknown(rule, NO_VALID_VALUES);
            }
            let result = quantify(*quantifier, &values, |raw| matcher.matches(raw));
            RuleOutcome {
                matched: Some(result.matched),
                aggregate: None,
                entity_id: result.entity_id,
                detail: format!(
                    "{}: {} '{}'",
                    rule.name,
                    matcher.condition.as_str(),
                    matcher.needle()
                ),
                invalid_reason: None,
            }
        }
        RuleShape::NumericSemafor { .. } | RuleShape::BinaryCountSemafor { .. } => {
            error!(rule_id = %rule.id, "Rule {}: escalation rule evaluated as single-level", rule.name);
            return RuleOutcome::unknown(rule, UNSUPPORTED);
        }
    };

    trace!(rule_id = %rule.id, matched = ?outcome.matched, "{}", outcome.detail);
    outcome
}

/// Read the single value an escalation rule compares against its levels
///
/// Returns the rule-level invalid reason when no input is readable.
pub fn read_scalar(
    rule: &RuleDefinition,
    collector: &mut Collector,
    lookup: &dyn StateLookup,
) -> Result<ScalarReading, &'static str> {
    match &rule.shape {
        RuleShape::NumericSemafor { aggregate, .. } => {
            let values = collector.collect(rule, lookup, parse_numeric);
            if values.is_empty() {
                return Err(NO_VALID_VALUES);
            }
            let (value, entity_id) = aggregate_numeric(&values, *aggregate);
            Ok(ScalarReading {
                value: AggregateValue::Number(value),
                entity_id: entity_id.map(str::to_string),
            })
        }
        RuleShape::BinaryCountSemafor { .. } => {
            let values = collector.collect(rule, lookup, parse_binary);
            if values.is_empty() {
                return Err(NO_VALID_VALUES);
            }
            Ok(ScalarReading {
                value: AggregateValue::Count(count_on(&values)),
                entity_id: None,
            })
        }
        _ => {
            error!(rule_id = %rule.id, "Rule {}: semafor mode is not supported for this rule shape", rule.name);
            Err(UNSUPPORTED)
        }
    }
}
