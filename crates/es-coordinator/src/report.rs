//! JSON report and rules export snapshots

use chrono::{DateTime, Utc};
use es_core::{RuleId, SeverityLevel, StateLookup};
use es_engine::{GlobalSeverityState, RuleRuntimeState};
use es_rules::{RuleDefinition, RulesExport};
use indexmap::IndexMap;
use serde_json::{json, Value};

use crate::config::{EmailSettings, MobileSettings, NotificationSettings};

/// Everything a report is built from, borrowed from the coordinator
pub struct ReportSource<'a> {
    pub rules: &'a [RuleDefinition],
    pub states: &'a IndexMap<RuleId, RuleRuntimeState>,
    pub published: &'a GlobalSeverityState,
    pub settings: &'a NotificationSettings,
    pub lookup: &'a dyn StateLookup,
}

/// Full diagnostic snapshot
pub fn build_report(source: &ReportSource<'_>, now: DateTime<Utc>) -> Value {
    let rules: Vec<_> = source.rules.iter().map(RuleDefinition::to_config).collect();

    json!({
        "generated_at": now,
        "config": {
            "rules": rules,
            "mobile_notifications": mobile_summary(&source.settings.mobile),
            "email": email_summary(&source.settings.email),
            "notification_timeout_seconds": source.settings.notification_timeout_seconds,
        },
        "states": entity_rows(source.rules, source.lookup),
        "rule_states": rule_state_rows(source.rules, source.states),
        "outputs": source.published.to_attributes(),
    })
}

fn per_level<T: serde::Serialize>(f: impl Fn(SeverityLevel) -> T) -> Value {
    let map: serde_json::Map<String, Value> = SeverityLevel::ALL
        .iter()
        .map(|level| (level.as_str().to_string(), json!(f(*level))))
        .collect();
    Value::Object(map)
}

fn mobile_summary(mobile: &MobileSettings) -> Value {
    json!({
        "enabled": mobile.enabled,
        "targets": per_level(|level| mobile.targets_for(Some(level)).to_vec()),
        "urgent": per_level(|level| mobile.urgent_for(Some(level))),
    })
}

fn email_summary(email: &EmailSettings) -> Value {
    json!({
        "enabled": !email.levels.is_empty() && email.has_recipient(),
        "recipient": email.recipient,
        "recipient_notify": email.recipient_notify,
        "recipient_limit": email.recipient_limit,
        "recipient_shutdown": email.recipient_shutdown,
        "levels": email.levels,
    })
}

fn entity_rows(rules: &[RuleDefinition], lookup: &dyn StateLookup) -> Vec<Value> {
    rules
        .iter()
        .flat_map(|rule| {
            rule.entities.iter().map(move |entity_id| {
                let reading = lookup.lookup(entity_id);
                json!({
                    "rule_id": rule.id,
                    "rule_name": rule.name,
                    "entity_id": entity_id,
                    "state": reading.raw_state,
                    "valid": reading.valid,
                })
            })
        })
        .collect()
}

fn rule_state_rows(
    rules: &[RuleDefinition],
    states: &IndexMap<RuleId, RuleRuntimeState>,
) -> Vec<Value> {
    rules
        .iter()
        .filter_map(|rule| {
            let runtime = states.get(&rule.id)?;
            let config = rule.to_config();
            Some(json!({
                "rule_id": rule.id,
                "rule_name": rule.name,
                "active": runtime.active,
                "active_since": runtime.active_since,
                "last_match": runtime.last_match,
                "last_aggregate": runtime.last_aggregate,
                "last_entity": runtime.last_entity,
                "last_detail": runtime.last_detail,
                "last_update": runtime.last_update,
                "latched": rule.latched,
                "notify_email": rule.notify.email,
                "notify_mobile": rule.notify.mobile,
                "unknown_handling": rule.unknown_handling,
                "severity_mode": config.severity_mode,
                "direction": config.direction,
                "current_level": runtime.current_level,
                "latched_level": runtime.latched_level,
                "active_levels": runtime.active_levels,
            }))
        })
        .collect()
}

/// The loaded rules in their raw configuration shape
pub fn build_rules_export(rules: &[RuleDefinition], now: DateTime<Utc>) -> Value {
    let export = RulesExport::from_rules(rules);
    json!({
        "generated_at": now,
        "version": export.version,
        "rules": export.rules,
    })
}
