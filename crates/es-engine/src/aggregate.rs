//! Reduction of per-input values to one aggregate

use es_rules::NumericAggregate;
use serde::Serialize;
use std::fmt;

/// Aggregate value of a rule on one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregateValue {
    Number(f64),
    /// Number of binary inputs reading `on`
    Count(usize),
}

impl AggregateValue {
    pub fn as_f64(self) -> f64 {
        match self {
            AggregateValue::Number(value) => value,
            AggregateValue::Count(count) => count as f64,
        }
    }
}

impl fmt::Display for AggregateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateValue::Number(value) => write!(f, "{value}"),
            AggregateValue::Count(count) => write!(f, "{count}"),
        }
    }
}

/// Reduce numeric inputs; `values` must not be empty
///
/// `min` and `max` report the entity holding the extreme value, the first
/// one in input order on ties. `sum` and `avg` have no attribution.
pub fn aggregate_numeric<'a>(
    values: &'a [(String, f64)],
    aggregate: NumericAggregate,
) -> (f64, Option<&'a str>) {
    match aggregate {
        NumericAggregate::Min => extreme(values, |candidate, best| candidate < best),
        NumericAggregate::Max => extreme(values, |candidate, best| candidate > best),
        NumericAggregate::Sum => (values.iter().map(|(_, v)| v).sum(), None),
        NumericAggregate::Avg => {
            let sum: f64 = values.iter().map(|(_, v)| v).sum();
            (sum / values.len().max(1) as f64, None)
        }
    }
}

fn extreme<'a>(
    values: &'a [(String, f64)],
    better: impl Fn(f64, f64) -> bool,
) -> (f64, Option<&'a str>) {
    let mut iter = values.iter();
    let Some((first_entity, first_value)) = iter.next() else {
        return (f64::NAN, None);
    };
    let mut best = (*first_value, first_entity.as_str());
    for (entity_id, value) in iter {
        // Strict comparison keeps the earliest input on ties
        if better(*value, best.0) {
            best = (*value, entity_id.as_str());
        }
    }
    (best.0, Some(best.1))
}

/// Number of binary inputs reading `on`
pub fn count_on(values: &[(String, bool)]) -> usize {
    values.iter().filter(|(_, on)| *on).count()
}
