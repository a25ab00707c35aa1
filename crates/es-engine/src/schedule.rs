//! Per-rule interval gating with deterministic phase offsets

use es_rules::RuleDefinition;

use crate::runtime::RuleRuntimeState;

/// Phase offset of a rule within its interval, in `[0, interval)`
///
/// Derived from the CRC-32 of the rule id, so it is stable across restarts
/// and spreads rules sharing an interval over different ticks.
pub fn deterministic_offset(rule_id: &str, interval_seconds: u32) -> u32 {
    if interval_seconds <= 1 {
        return 0;
    }
    crc32fast::hash(rule_id.as_bytes()) % interval_seconds
}

/// Initial `last_eval_monotonic` for a freshly loaded rule
///
/// The first evaluation then happens `offset` seconds after `now`.
pub fn seed_last_eval(rule_id: &str, interval_seconds: u32, now: f64) -> f64 {
    let interval = interval_seconds.max(1);
    let offset = deterministic_offset(rule_id, interval);
    now - f64::from(interval - offset)
}

/// Slack for timer wake-up jitter when comparing against the interval
pub const DUE_TOLERANCE_SECONDS: f64 = 0.001;

/// Whether enough time has passed since the rule's last evaluation
pub fn is_due(state: &RuleRuntimeState, interval_seconds: u32, now: f64) -> bool {
    match state.last_eval_monotonic {
        None => true,
        Some(last) => now - last + DUE_TOLERANCE_SECONDS >= f64::from(interval_seconds),
    }
}

/// Engine tick cadence: the shortest rule interval, at least one second
pub fn tick_interval(rules: &[RuleDefinition]) -> u32 {
    rules
        .iter()
        .map(|rule| rule.interval_seconds)
        .min()
        .unwrap_or(1)
        .max(1)
}
