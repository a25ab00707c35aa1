//! Aggregation of rule states into one global severity state

use chrono::{DateTime, Utc};
use es_core::{RuleId, SeverityLevel};
use es_rules::{DataType, RuleDefinition};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::fmt;

use crate::aggregate::AggregateValue;
use crate::runtime::RuleRuntimeState;

/// Value attached to an active event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventValue {
    Number(f64),
    Count(usize),
    Text(String),
}

impl From<AggregateValue> for EventValue {
    fn from(value: AggregateValue) -> Self {
        match value {
            AggregateValue::Number(value) => EventValue::Number(value),
            AggregateValue::Count(count) => EventValue::Count(count),
        }
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventValue::Number(value) => write!(f, "{value}"),
            EventValue::Count(count) => write!(f, "{count}"),
            EventValue::Text(text) => f.write_str(text),
        }
    }
}

/// One currently active rule at its reported level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveEvent {
    pub rule_id: String,
    /// Rule name
    pub reason: String,
    pub level: SeverityLevel,
    pub entity_id: Option<String>,
    pub value: Option<EventValue>,
    pub detail: String,
    pub latched: bool,
    pub notify_email: bool,
    pub notify_mobile: bool,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub data_type: String,
}

impl ActiveEvent {
    /// Event for an active rule, `None` when the rule is inactive
    pub fn from_rule(rule: &RuleDefinition, state: &RuleRuntimeState) -> Option<Self> {
        let level = state.active_level(rule)?;
        Some(Self {
            rule_id: rule.id.to_string(),
            reason: rule.name.clone(),
            level,
            entity_id: state.last_entity.clone(),
            value: state.last_aggregate.map(EventValue::from),
            detail: state
                .last_detail
                .clone()
                .unwrap_or_else(|| rule.name.clone()),
            latched: rule.latched,
            notify_email: rule.notify.email,
            notify_mobile: rule.notify.mobile,
            first_seen: state.active_since,
            last_seen: state.last_update.or(state.active_since),
            data_type: data_type_name(rule.data_type()).to_string(),
        })
    }

    /// Equality ignoring `last_seen`, which moves on every evaluation
    fn same_as(&self, other: &ActiveEvent) -> bool {
        Self {
            last_seen: other.last_seen,
            ..self.clone()
        } == *other
    }
}

fn data_type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Numeric => "numeric",
        DataType::Binary => "binary",
        DataType::Text => "text",
    }
}

/// Subset of rules a severity view is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Every rule: the authoritative state
    All,
    /// Rules with `notify_email`
    Email,
    /// Rules with `notify_mobile`
    Mobile,
}

impl Channel {
    pub fn includes(self, rule: &RuleDefinition) -> bool {
        match self {
            Channel::All => true,
            Channel::Email => rule.notify.email,
            Channel::Mobile => rule.notify.mobile,
        }
    }
}

/// Active events of the rules in `channel`, in deterministic order
pub fn collect_events(
    rules: &[RuleDefinition],
    states: &IndexMap<RuleId, RuleRuntimeState>,
    channel: Channel,
) -> Vec<ActiveEvent> {
    let mut events: Vec<ActiveEvent> = rules
        .iter()
        .filter(|rule| channel.includes(rule))
        .filter_map(|rule| {
            states
                .get(&rule.id)
                .and_then(|state| ActiveEvent::from_rule(rule, state))
        })
        .collect();
    sort_events(&mut events);
    events
}

/// Order by first-seen, then rule id
pub fn sort_events(events: &mut [ActiveEvent]) {
    events.sort_by(|a, b| {
        a.first_seen
            .cmp(&b.first_seen)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
}

/// Per-reason summary of active events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonSummary {
    pub count: usize,
    pub highest_level: Option<SeverityLevel>,
    pub latest_seen: Option<DateTime<Utc>>,
    pub latest_detail: String,
    pub entity_ids: Vec<String>,
    pub rule_ids: Vec<String>,
}

/// Global severity derived from all active events
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlobalSeverityState {
    pub active: bool,
    /// Highest active level, `None` when normal
    pub level: Option<SeverityLevel>,
    pub primary_reason: Option<String>,
    pub primary_level: Option<SeverityLevel>,
    pub primary_entity: Option<String>,
    pub primary_value: Option<EventValue>,
    pub primary_detail: Option<String>,
    pub active_events: Vec<ActiveEvent>,
    pub acknowledged: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub latched_since: Option<DateTime<Utc>>,
}

impl GlobalSeverityState {
    /// Inactive state stamped at `now`
    pub fn normal(now: DateTime<Utc>) -> Self {
        Self {
            last_update: Some(now),
            ..Default::default()
        }
    }

    /// Build from sorted events
    ///
    /// The primary event has the highest level, then the earliest first-seen,
    /// then the lowest rule id. When level and events (apart from their
    /// `last_seen`) equal `previous`, its `last_update` is kept.
    pub fn from_events(
        events: Vec<ActiveEvent>,
        acknowledged: bool,
        previous: &GlobalSeverityState,
        now: DateTime<Utc>,
    ) -> Self {
        let primary = events
            .iter()
            .min_by(|a, b| {
                b.level
                    .cmp(&a.level)
                    .then_with(|| a.first_seen.cmp(&b.first_seen))
                    .then_with(|| a.rule_id.cmp(&b.rule_id))
            })
            .cloned();
        let level = events.iter().map(|event| event.level).max();

        let mut state = match primary {
            None => Self::default(),
            Some(primary) => Self {
                active: true,
                level,
                primary_reason: Some(primary.reason),
                primary_level: Some(primary.level),
                primary_entity: primary.entity_id,
                primary_value: primary.value,
                primary_detail: Some(primary.detail),
                active_events: Vec::new(),
                acknowledged,
                last_update: None,
                latched_since: primary.first_seen,
            },
        };
        state.active_events = events;

        state.last_update = if previous.last_update.is_some() && state.same_as(previous) {
            previous.last_update
        } else {
            Some(now)
        };
        state
    }

    fn same_as(&self, previous: &GlobalSeverityState) -> bool {
        self.level == previous.level
            && self.active_events.len() == previous.active_events.len()
            && self
                .active_events
                .iter()
                .zip(&previous.active_events)
                .all(|(a, b)| a.same_as(b))
    }

    /// Level name, `normal` when inactive
    pub fn level_name(&self) -> &'static str {
        SeverityLevel::name_or_normal(self.level)
    }

    /// Distinct reasons in event order
    pub fn active_reasons(&self) -> Vec<String> {
        let mut reasons: Vec<String> = Vec::new();
        for event in &self.active_events {
            if !event.reason.is_empty() && !reasons.contains(&event.reason) {
                reasons.push(event.reason.clone());
            }
        }
        reasons
    }

    /// Distinct levels in event order
    pub fn active_levels(&self) -> Vec<SeverityLevel> {
        let mut levels = Vec::new();
        for event in &self.active_events {
            if !levels.contains(&event.level) {
                levels.push(event.level);
            }
        }
        levels
    }

    /// Active events grouped by reason, in first-occurrence order
    pub fn events_by_reason(&self) -> IndexMap<String, ReasonSummary> {
        let mut groups: IndexMap<String, (ReasonSummary, BTreeSet<String>, BTreeSet<String>)> =
            IndexMap::new();

        for event in &self.active_events {
            if event.reason.is_empty() {
                continue;
            }
            let (summary, entity_ids, rule_ids) =
                groups.entry(event.reason.clone()).or_insert_with(|| {
                    (
                        ReasonSummary {
                            count: 0,
                            highest_level: None,
                            latest_seen: None,
                            latest_detail: String::new(),
                            entity_ids: Vec::new(),
                            rule_ids: Vec::new(),
                        },
                        BTreeSet::new(),
                        BTreeSet::new(),
                    )
                });

            summary.count += 1;
            summary.highest_level = summary.highest_level.max(Some(event.level));

            let seen_at = event.last_seen.or(event.first_seen);
            if seen_at >= summary.latest_seen {
                summary.latest_seen = seen_at;
                summary.latest_detail = if event.detail.is_empty() {
                    event.reason.clone()
                } else {
                    event.detail.clone()
                };
            }

            if let Some(entity_id) = &event.entity_id {
                entity_ids.insert(entity_id.clone());
            }
            rule_ids.insert(event.rule_id.clone());
        }

        groups
            .into_iter()
            .map(|(reason, (mut summary, entity_ids, rule_ids))| {
                summary.entity_ids = entity_ids.into_iter().collect();
                summary.rule_ids = rule_ids.into_iter().collect();
                (reason, summary)
            })
            .collect()
    }

    /// Flat attribute view used by sensors and reports
    pub fn to_attributes(&self) -> serde_json::Value {
        json!({
            "active": self.active,
            "level": self.level_name(),
            "primary_reason": self.primary_reason,
            "primary_level": self.primary_level,
            "primary_sensor_entity": self.primary_entity,
            "primary_value": self.primary_value,
            "primary_detail": self.primary_detail,
            "active_events": self.active_events,
            "active_reasons": self.active_reasons(),
            "active_levels": self.active_levels(),
            "events_by_reason": self.events_by_reason(),
            "acknowledged": self.acknowledged,
            "last_update": self.last_update,
            "latched_since": self.latched_since,
        })
    }
}
