//! Reading and classifying rule inputs

use es_core::{EntityReading, RuleId, StateLookup};
use es_rules::RuleDefinition;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Why a single input was excluded from aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// No state exists for the entity
    Missing,
    /// The entity reports `unavailable` or `unknown`
    Unknown,
    /// The state cannot be parsed for the rule's data type
    Invalid,
}

impl InvalidReason {
    pub fn as_str(self) -> &'static str {
        match self {
            InvalidReason::Missing => "missing",
            InvalidReason::Unknown => "unknown",
            InvalidReason::Invalid => "invalid",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readable state of an input, before any type-specific parsing
fn readable(reading: &EntityReading) -> Result<&str, InvalidReason> {
    match reading.raw_state.as_deref() {
        None => Err(InvalidReason::Missing),
        Some(_) if !reading.valid => Err(InvalidReason::Unknown),
        Some(raw) => Ok(raw),
    }
}

pub fn parse_numeric(reading: &EntityReading) -> Result<f64, InvalidReason> {
    readable(reading)?
        .trim()
        .parse::<f64>()
        .map_err(|_| InvalidReason::Invalid)
}

/// `true` for `on`, `false` for `off`, case-insensitive
pub fn parse_binary(reading: &EntityReading) -> Result<bool, InvalidReason> {
    let raw = readable(reading)?;
    if raw.eq_ignore_ascii_case("on") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("off") {
        Ok(false)
    } else {
        Err(InvalidReason::Invalid)
    }
}

pub fn parse_text(reading: &EntityReading) -> Result<String, InvalidReason> {
    readable(reading).map(str::to_string)
}

/// Collects typed input values for rules
///
/// Each (rule, entity, reason) combination of an invalid input is logged at
/// warning level the first time it is seen and at debug level afterwards.
#[derive(Debug, Default)]
pub struct Collector {
    logged: HashSet<(RuleId, String, InvalidReason)>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid `(entity_id, value)` pairs in the rule's entity order
    pub fn collect<T>(
        &mut self,
        rule: &RuleDefinition,
        lookup: &dyn StateLookup,
        parse: impl Fn(&EntityReading) -> Result<T, InvalidReason>,
    ) -> Vec<(String, T)> {
        let mut values = Vec::with_capacity(rule.entities.len());
        for entity_id in &rule.entities {
            let reading = lookup.lookup(entity_id);
            match parse(&reading) {
                Ok(value) => values.push((entity_id.clone(), value)),
                Err(reason) => self.log_invalid(rule, entity_id, reason, &reading),
            }
        }
        values
    }

    fn log_invalid(
        &mut self,
        rule: &RuleDefinition,
        entity_id: &str,
        reason: InvalidReason,
        reading: &EntityReading,
    ) {
        let state = reading.raw_state.as_deref().unwrap_or("-");
        let key = (rule.id.clone(), entity_id.to_string(), reason);
        if self.logged.insert(key) {
            warn!(
                rule_id = %rule.id,
                entity_id,
                reason = %reason,
                "Rule {}: invalid state for {}: {}",
                rule.name,
                entity_id,
                state
            );
        } else {
            debug!(
                rule_id = %rule.id,
                entity_id,
                reason = %reason,
                "Rule {}: invalid state for {}: {}",
                rule.name,
                entity_id,
                state
            );
        }
    }

    /// Number of distinct invalid combinations seen so far
    pub fn logged_count(&self) -> usize {
        self.logged.len()
    }
}
