//! Tick-level behaviour of the rule engine driven by a manual clock

use chrono::{DateTime, Utc};
use es_core::{Clock, ManualClock, RuleId, SeverityLevel};
use es_engine::{deterministic_offset, AggregateValue, Channel, RuleEngine, NO_VALID_VALUES};
use es_rules::RuleSet;
use es_state_store::StateStore;
use serde_json::{json, Value};
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn engine(rules: Value, clock: &ManualClock) -> RuleEngine {
    let set = RuleSet::from_values(rules.as_array().unwrap().clone());
    assert!(set.rejected().is_empty(), "rejected: {:?}", set.rejected());
    RuleEngine::from_rule_set(set, Arc::new(clock.clone()))
}

fn id(value: &str) -> RuleId {
    RuleId::new(value).unwrap()
}

/// Tick `count` times, one second apart, starting at the current time
fn run(engine: &mut RuleEngine, store: &StateStore, clock: &ManualClock, count: usize) {
    for i in 0..count {
        if i > 0 {
            clock.advance_seconds(1);
        }
        engine.evaluate_tick(store);
    }
}

fn max_rule(rule_id: &str, duration: u32, latched: bool) -> Value {
    json!({
        "rule_id": rule_id,
        "name": "Pack max voltage",
        "entities": ["sensor.cell_1", "sensor.cell_2"],
        "aggregate": "max",
        "condition": "gt",
        "thresholds": [3.5],
        "duration_seconds": duration,
        "interval_seconds": 1,
        "level": "shutdown",
        "latched": latched
    })
}

// ============================================================================
// Simple rules
// ============================================================================

#[test]
fn test_end_to_end_max_rule_activates_after_duration() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.4");
    store.set("sensor.cell_2", "3.6");
    let mut engine = engine(json!([max_rule("pack_max", 5, false)]), &clock);

    // t = 0..4: streak running, not yet active
    run(&mut engine, &store, &clock, 5);
    let state = engine.rule_state(&id("pack_max")).unwrap();
    assert!(!state.active);
    assert_eq!(state.violation_started_at, Some(0.0));

    // t = 5: five seconds of unbroken violation
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);

    let state = engine.rule_state(&id("pack_max")).unwrap();
    assert!(state.active);
    assert_eq!(state.active_since, Some(clock.tick().wall));
    assert_eq!(state.last_entity.as_deref(), Some("sensor.cell_2"));
    assert_eq!(state.last_aggregate, Some(AggregateValue::Number(3.6)));
    assert_eq!(
        state.last_detail.as_deref(),
        Some("Pack max voltage: max=3.600 gt 3.5")
    );

    let global = engine.global_state();
    assert!(global.active);
    assert_eq!(global.level, Some(SeverityLevel::Shutdown));
    assert_eq!(global.primary_entity.as_deref(), Some("sensor.cell_2"));
    assert_eq!(global.primary_reason.as_deref(), Some("Pack max voltage"));
}

#[test]
fn test_non_latched_clears_on_next_false_match() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.7");
    store.set("sensor.cell_2", "3.3");
    let mut engine = engine(json!([max_rule("pack_max", 1, false)]), &clock);

    run(&mut engine, &store, &clock, 2);
    assert!(engine.global_state().active);

    store.set("sensor.cell_1", "3.4");
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);

    let state = engine.rule_state(&id("pack_max")).unwrap();
    assert!(!state.active);
    assert_eq!(state.active_since, None);
    assert!(!engine.global_state().active);
    assert_eq!(engine.global_state().level_name(), "normal");
}

#[test]
fn test_latched_rule_holds_until_reset() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.7");
    store.set("sensor.cell_2", "3.3");
    let mut engine = engine(json!([max_rule("pack_max", 1, true)]), &clock);

    run(&mut engine, &store, &clock, 2);
    store.set("sensor.cell_1", "3.0");
    clock.advance_seconds(1);
    run(&mut engine, &store, &clock, 3);

    let global = engine.global_state();
    assert!(global.active);
    assert!(global.active_events[0].latched);

    engine.reset_all();
    assert!(!engine.global_state().active);
    assert!(!engine.rule_state(&id("pack_max")).unwrap().active);

    // After reset the condition is clear, so the rule stays inactive
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);
    assert!(!engine.global_state().active);
}

#[test]
fn test_between_bounds_are_inclusive() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.temp", "40");
    let mut engine = engine(
        json!([{
            "rule_id": "temp_window",
            "name": "Temperature window",
            "entities": ["sensor.temp"],
            "aggregate": "avg",
            "condition": "between",
            "thresholds": [40, 45],
            "duration_seconds": 1
        }]),
        &clock,
    );

    run(&mut engine, &store, &clock, 2);
    let state = engine.rule_state(&id("temp_window")).unwrap();
    assert!(state.active);
    assert_eq!(state.last_entity, None);
    assert_eq!(
        state.last_detail.as_deref(),
        Some("Temperature window: avg=40.000 between 40..45")
    );
}

// ============================================================================
// Interval gating
// ============================================================================

#[test]
fn test_rule_skipped_between_intervals() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.7");
    let mut engine = engine(
        json!([{
            "rule_id": "slow_rule",
            "name": "Slow",
            "entities": ["sensor.cell_1"],
            "aggregate": "max",
            "condition": "gt",
            "thresholds": [3.5],
            "duration_seconds": 10,
            "interval_seconds": 5
        }]),
        &clock,
    );

    // Not due before its phase offset
    let offset = deterministic_offset("slow_rule", 5);
    if offset > 0 {
        engine.evaluate_tick(&store);
        assert_eq!(engine.rule_state(&id("slow_rule")).unwrap().last_update, None);
    }

    clock.set_monotonic(f64::from(offset));
    engine.evaluate_tick(&store);
    let evaluated = engine.rule_state(&id("slow_rule")).unwrap().clone();
    assert_eq!(evaluated.last_eval_monotonic, Some(f64::from(offset)));

    store.set("sensor.cell_1", "2.0");
    for _ in 0..4 {
        clock.advance_seconds(1);
        engine.evaluate_tick(&store);
        assert_eq!(engine.rule_state(&id("slow_rule")).unwrap(), &evaluated);
    }

    clock.advance_seconds(1);
    engine.evaluate_tick(&store);
    let state = engine.rule_state(&id("slow_rule")).unwrap();
    assert_eq!(state.last_eval_monotonic, Some(f64::from(offset) + 5.0));
    assert_eq!(state.violation_started_at, None);
}

#[test]
fn test_tick_interval_is_shortest_rule_interval() {
    let clock = ManualClock::at(start());
    let rules = json!([
        {
            "rule_id": "a", "name": "A", "entities": ["sensor.a"],
            "aggregate": "max", "condition": "gt", "thresholds": [1],
            "duration_seconds": 10, "interval_seconds": 4
        },
        {
            "rule_id": "b", "name": "B", "entities": ["sensor.b"],
            "aggregate": "max", "condition": "gt", "thresholds": [1],
            "duration_seconds": 10, "interval_seconds": 3
        }
    ]);
    assert_eq!(engine(rules, &clock).tick_interval(), 3);
    assert_eq!(engine(json!([]), &clock).tick_interval(), 1);
}

// ============================================================================
// Unknown handling
// ============================================================================

#[test]
fn test_ignore_policy_freezes_active_rule() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.7");
    store.set("sensor.cell_2", "3.7");
    let mut engine = engine(json!([max_rule("pack_max", 1, false)]), &clock);

    run(&mut engine, &store, &clock, 2);
    assert!(engine.global_state().active);

    store.set("sensor.cell_1", "unavailable");
    store.remove("sensor.cell_2");
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);

    let state = engine.rule_state(&id("pack_max")).unwrap();
    assert!(state.active);
    assert_eq!(state.last_match, None);
    assert_eq!(state.last_invalid_reason, Some(NO_VALID_VALUES));
    assert_eq!(
        state.last_detail.as_deref(),
        Some("Pack max voltage: no_valid_values")
    );
    assert_eq!(state.violation_started_at, Some(0.0));
}

#[test]
fn test_treat_violation_activates_without_inputs() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    let mut engine = engine(
        json!([{
            "rule_id": "heartbeat",
            "name": "Heartbeat lost",
            "data_type": "binary",
            "entities": ["binary_sensor.heartbeat"],
            "aggregate": "all",
            "condition": "is_on",
            "duration_seconds": 2,
            "level": "notify",
            "unknown_handling": "treat_violation"
        }]),
        &clock,
    );

    run(&mut engine, &store, &clock, 3);
    assert_eq!(engine.global_state().level, Some(SeverityLevel::Notify));

    // A readable value resumes normal evaluation
    store.set("binary_sensor.heartbeat", "OFF");
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);
    assert!(!engine.global_state().active);
}

#[test]
fn test_partially_invalid_inputs_are_excluded() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "garbage");
    store.set("sensor.cell_2", "3.6");
    let mut engine = engine(json!([max_rule("pack_max", 1, false)]), &clock);

    run(&mut engine, &store, &clock, 2);
    let state = engine.rule_state(&id("pack_max")).unwrap();
    assert!(state.active);
    assert_eq!(state.last_entity.as_deref(), Some("sensor.cell_2"));
    assert_eq!(state.last_invalid_reason, None);
}

// ============================================================================
// Binary and text rules
// ============================================================================

#[test]
fn test_binary_any_attributes_first_match() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("binary_sensor.leak_1", "off");
    store.set("binary_sensor.leak_2", "on");
    store.set("binary_sensor.leak_3", "on");
    let mut engine = engine(
        json!([{
            "rule_id": "leak",
            "name": "Water leak",
            "data_type": "binary",
            "entities": ["binary_sensor.leak_1", "binary_sensor.leak_2", "binary_sensor.leak_3"],
            "aggregate": "any",
            "condition": "is_on",
            "duration_seconds": 1
        }]),
        &clock,
    );

    run(&mut engine, &store, &clock, 2);
    let state = engine.rule_state(&id("leak")).unwrap();
    assert!(state.active);
    assert_eq!(state.last_entity.as_deref(), Some("binary_sensor.leak_2"));
    assert_eq!(state.last_detail.as_deref(), Some("Water leak: any is on"));
}

#[test]
fn test_binary_count_detail() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("binary_sensor.a", "on");
    store.set("binary_sensor.b", "on");
    store.set("binary_sensor.c", "off");
    let mut engine = engine(
        json!([{
            "rule_id": "doors",
            "name": "Doors",
            "data_type": "binary",
            "entities": ["binary_sensor.a", "binary_sensor.b", "binary_sensor.c"],
            "aggregate": "count",
            "condition": "between",
            "thresholds": [1, 3],
            "duration_seconds": 1
        }]),
        &clock,
    );

    run(&mut engine, &store, &clock, 2);
    let state = engine.rule_state(&id("doors")).unwrap();
    assert!(state.active);
    assert_eq!(state.last_aggregate, Some(AggregateValue::Count(2)));
    assert_eq!(state.last_detail.as_deref(), Some("Doors: count=2 between 1..3"));
}

#[test]
fn test_text_contains_normalizes_both_sides() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.inverter_1", "Running");
    store.set("sensor.inverter_2", "  GRID FAULT  ");
    let mut engine = engine(
        json!([{
            "rule_id": "inverter_fault",
            "name": "Inverter fault",
            "data_type": "text",
            "entities": ["sensor.inverter_1", "sensor.inverter_2"],
            "aggregate": "any",
            "condition": "contains",
            "thresholds": [" Fault "],
            "duration_seconds": 1
        }]),
        &clock,
    );

    run(&mut engine, &store, &clock, 2);
    let state = engine.rule_state(&id("inverter_fault")).unwrap();
    assert!(state.active);
    assert_eq!(state.last_entity.as_deref(), Some("sensor.inverter_2"));
    assert_eq!(
        state.last_detail.as_deref(),
        Some("Inverter fault: contains 'fault'")
    );
}

// ============================================================================
// Semafor rules
// ============================================================================

fn cell_semafor(latched: bool) -> Value {
    json!({
        "rule_id": "cell_semafor",
        "name": "Cell voltage",
        "entities": ["sensor.cell_1", "sensor.cell_2"],
        "severity_mode": "semafor",
        "aggregate": "max",
        "direction": "higher_is_worse",
        "latched": latched,
        "levels": {
            "notify": {"threshold": 3.5, "duration_seconds": 1},
            "limit": {"threshold": 3.6, "duration_seconds": 1},
            "shutdown": {"threshold": 3.8, "duration_seconds": 1}
        }
    })
}

#[test]
fn test_semafor_escalation_and_deescalation() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.9");
    store.set("sensor.cell_2", "3.4");
    let mut engine = engine(json!([cell_semafor(false)]), &clock);

    run(&mut engine, &store, &clock, 2);
    let state = engine.rule_state(&id("cell_semafor")).unwrap();
    assert_eq!(state.current_level, Some(SeverityLevel::Shutdown));
    assert_eq!(
        state.last_detail.as_deref(),
        Some("Cell voltage: shutdown 3.9 >= 3.8")
    );
    assert_eq!(engine.global_state().level, Some(SeverityLevel::Shutdown));

    store.set("sensor.cell_1", "3.65");
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);

    let state = engine.rule_state(&id("cell_semafor")).unwrap();
    assert_eq!(state.current_level, Some(SeverityLevel::Limit));
    assert_eq!(
        state.active_levels,
        vec![SeverityLevel::Notify, SeverityLevel::Limit]
    );
    assert_eq!(engine.global_state().level, Some(SeverityLevel::Limit));
    assert_eq!(
        engine.global_state().primary_detail.as_deref(),
        Some("Cell voltage: limit 3.65 >= 3.6")
    );
}

#[test]
fn test_semafor_latched_reports_maximum() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.9");
    store.set("sensor.cell_2", "3.4");
    let mut engine = engine(json!([cell_semafor(true)]), &clock);

    run(&mut engine, &store, &clock, 2);
    store.set("sensor.cell_1", "3.55");
    clock.advance_seconds(1);
    run(&mut engine, &store, &clock, 2);

    let state = engine.rule_state(&id("cell_semafor")).unwrap();
    assert_eq!(state.active_levels, vec![SeverityLevel::Notify]);
    assert_eq!(state.current_level, Some(SeverityLevel::Shutdown));
    assert_eq!(engine.global_state().level, Some(SeverityLevel::Shutdown));
}

#[test]
fn test_semafor_unknown_treat_ok_clears_all_levels() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.9");
    let mut rule = cell_semafor(false);
    rule["unknown_handling"] = json!("treat_ok");
    let mut engine = engine(json!([rule]), &clock);

    run(&mut engine, &store, &clock, 2);
    assert!(engine.global_state().active);

    store.set("sensor.cell_1", "unknown");
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);

    let state = engine.rule_state(&id("cell_semafor")).unwrap();
    assert_eq!(state.current_level, None);
    assert!(state.active_levels.is_empty());
    assert_eq!(state.last_detail.as_deref(), Some("Cell voltage: no_valid_values"));
}

#[test]
fn test_semafor_lower_is_worse() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.battery_soc", "8");
    let rule = json!({
        "rule_id": "soc_semafor",
        "name": "Battery SOC",
        "entities": ["sensor.battery_soc"],
        "severity_mode": "semafor",
        "aggregate": "min",
        "direction": "lower_is_worse",
        "levels": {
            "notify": {"threshold": 20, "duration_seconds": 1},
            "limit": {"threshold": 10, "duration_seconds": 1},
            "shutdown": {"threshold": 5, "duration_seconds": 1}
        }
    });
    let mut engine = engine(json!([rule]), &clock);

    run(&mut engine, &store, &clock, 2);
    let state = engine.rule_state(&id("soc_semafor")).unwrap();
    assert_eq!(state.current_level, Some(SeverityLevel::Limit));
    assert_eq!(
        state.active_levels,
        vec![SeverityLevel::Notify, SeverityLevel::Limit]
    );
    assert_eq!(state.last_detail.as_deref(), Some("Battery SOC: limit 8 <= 10"));
    assert_eq!(engine.global_state().level, Some(SeverityLevel::Limit));
}

#[test]
fn test_semafor_binary_count() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("binary_sensor.door_a", "on");
    store.set("binary_sensor.door_b", "ON");
    store.set("binary_sensor.door_c", "off");
    let rule = json!({
        "rule_id": "doors_semafor",
        "name": "Doors open",
        "data_type": "binary",
        "entities": ["binary_sensor.door_a", "binary_sensor.door_b", "binary_sensor.door_c"],
        "severity_mode": "semafor",
        "aggregate": "count",
        "direction": "higher_is_worse",
        "levels": {
            "notify": {"threshold": 1, "duration_seconds": 1},
            "shutdown": {"threshold": 2, "duration_seconds": 1}
        }
    });
    let mut engine = engine(json!([rule]), &clock);

    run(&mut engine, &store, &clock, 2);
    let state = engine.rule_state(&id("doors_semafor")).unwrap();
    assert_eq!(state.current_level, Some(SeverityLevel::Shutdown));
    assert_eq!(state.last_aggregate, Some(AggregateValue::Count(2)));
    assert_eq!(state.last_detail.as_deref(), Some("Doors open: shutdown 2 >= 2"));

    store.set("binary_sensor.door_b", "off");
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);
    let state = engine.rule_state(&id("doors_semafor")).unwrap();
    assert_eq!(state.current_level, Some(SeverityLevel::Notify));
    assert_eq!(state.last_aggregate, Some(AggregateValue::Count(1)));
}

// ============================================================================
// Global state
// ============================================================================

#[test]
fn test_primary_selection_prefers_severity_then_first_seen() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.temp", "80");
    let mut engine = engine(
        json!([
            {
                "rule_id": "early_limit",
                "name": "Early limit",
                "entities": ["sensor.temp"],
                "aggregate": "max", "condition": "gt", "thresholds": [50],
                "duration_seconds": 1, "level": "limit"
            },
            {
                "rule_id": "late_limit",
                "name": "Late limit",
                "entities": ["sensor.temp"],
                "aggregate": "max", "condition": "gt", "thresholds": [50],
                "duration_seconds": 3, "level": "limit"
            },
            {
                "rule_id": "late_shutdown",
                "name": "Late shutdown",
                "entities": ["sensor.temp"],
                "aggregate": "max", "condition": "gt", "thresholds": [70],
                "duration_seconds": 4, "level": "shutdown"
            }
        ]),
        &clock,
    );

    run(&mut engine, &store, &clock, 4);
    let global = engine.global_state();
    assert_eq!(global.level, Some(SeverityLevel::Limit));
    assert_eq!(global.primary_reason.as_deref(), Some("Early limit"));
    assert_eq!(global.active_events.len(), 2);

    clock.advance_seconds(1);
    engine.evaluate_tick(&store);
    let global = engine.global_state();
    assert_eq!(global.level, Some(SeverityLevel::Shutdown));
    assert_eq!(global.primary_reason.as_deref(), Some("Late shutdown"));
    assert_eq!(global.active_events[0].rule_id, "early_limit");
}

#[test]
fn test_global_last_update_stable_without_changes() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.7");
    let mut engine = engine(json!([max_rule("pack_max", 1, false)]), &clock);

    run(&mut engine, &store, &clock, 2);
    let stamped = engine.global_state().last_update;
    let rule_update = engine.rule_state(&id("pack_max")).unwrap().last_update;

    clock.advance_seconds(1);
    engine.evaluate_tick(&store);

    assert_eq!(engine.global_state().last_update, stamped);
    assert_ne!(
        engine.rule_state(&id("pack_max")).unwrap().last_update,
        rule_update
    );
}

#[test]
fn test_channel_views_filter_rules() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.7");
    let mut quiet = max_rule("quiet", 1, false);
    quiet["notify_email"] = json!(false);
    let mut engine = engine(json!([quiet]), &clock);

    run(&mut engine, &store, &clock, 2);
    assert!(engine.global_state().active);
    assert!(!engine.channel_state(Channel::Email).active);
    assert!(engine.channel_state(Channel::Mobile).active);
}

#[test]
fn test_acknowledge_cleared_when_inactive() {
    let clock = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.7");
    let mut engine = engine(json!([max_rule("pack_max", 1, false)]), &clock);

    run(&mut engine, &store, &clock, 2);
    let before = engine.global_state().last_update;
    clock.advance_seconds(1);
    engine.acknowledge();
    assert!(engine.global_state().acknowledged);
    assert_ne!(engine.global_state().last_update, before);

    clock.advance_seconds(1);
    engine.evaluate_tick(&store);
    assert!(engine.global_state().acknowledged);

    store.set("sensor.cell_1", "3.0");
    clock.advance_seconds(1);
    engine.evaluate_tick(&store);
    assert!(!engine.global_state().acknowledged);
    assert!(!engine.is_acknowledged());
}

#[test]
fn test_independent_engines_do_not_share_state() {
    let clock_a = ManualClock::at(start());
    let clock_b = ManualClock::at(start());
    let store = StateStore::new();
    store.set("sensor.cell_1", "3.7");
    let mut a = engine(json!([max_rule("pack_max", 1, false)]), &clock_a);
    let b = engine(json!([max_rule("pack_max", 1, false)]), &clock_b);

    run(&mut a, &store, &clock_a, 2);
    assert!(a.global_state().active);
    assert!(!b.global_state().active);
}
