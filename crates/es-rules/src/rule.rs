//! Validated rule definitions

use es_core::{LevelMap, RuleId};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::{
    AggregateKind, ConditionKind, DataType, Direction, LevelConfig, RuleConfig, SeverityMode,
    ThresholdValue, UnknownHandling,
};
use crate::error::{RuleError, RuleResult};
use crate::shape::{
    BinaryTarget, LevelSpec, NumericAggregate, NumericCondition, Quantifier, RuleShape,
    SemaforLadder, SimpleTrigger, TextCondition, TextMatcher,
};

/// Which notification channels see this rule's activations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotifyChannels {
    pub email: bool,
    pub mobile: bool,
}

impl Default for NotifyChannels {
    fn default() -> Self {
        Self {
            email: true,
            mobile: true,
        }
    }
}

/// An immutable, validated monitoring rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleDefinition {
    pub id: RuleId,
    pub name: String,
    /// Input entity ids in evaluation order (never empty)
    pub entities: Vec<String>,
    /// Minimum time between evaluations
    pub interval_seconds: u32,
    pub latched: bool,
    pub unknown_handling: UnknownHandling,
    pub notify: NotifyChannels,
    pub shape: RuleShape,
}

impl RuleDefinition {
    pub fn data_type(&self) -> DataType {
        self.shape.data_type()
    }

    pub fn is_semafor(&self) -> bool {
        self.shape.is_semafor()
    }

    /// Convert back into the stored configuration shape
    pub fn to_config(&self) -> RuleConfig {
        let mut config = RuleConfig {
            rule_id: Some(self.id.to_string()),
            name: Some(self.name.clone()),
            data_type: self.data_type(),
            entities: self.entities.clone(),
            aggregate: None,
            condition: None,
            thresholds: Vec::new(),
            duration_seconds: crate::config::DEFAULT_RULE_DURATION,
            interval_seconds: i64::from(self.interval_seconds),
            level: crate::config::DEFAULT_RULE_LEVEL,
            latched: self.latched,
            unknown_handling: self.unknown_handling,
            severity_mode: if self.is_semafor() {
                SeverityMode::Semafor
            } else {
                SeverityMode::Simple
            },
            direction: None,
            levels: BTreeMap::new(),
            text_case_sensitive: false,
            text_trim: true,
            notify_email: self.notify.email,
            notify_mobile: self.notify.mobile,
        };

        if let Some(trigger) = self.shape.trigger() {
            config.duration_seconds = i64::from(trigger.duration_seconds);
            config.level = trigger.level;
        }
        if let Some(ladder) = self.shape.ladder() {
            config.direction = Some(ladder.direction);
            config.levels = ladder
                .configured()
                .map(|(level, spec)| {
                    (
                        level,
                        LevelConfig {
                            threshold: spec.threshold,
                            duration_seconds: i64::from(spec.duration_seconds),
                        },
                    )
                })
                .collect();
        }

        let numeric = |condition: &NumericCondition| {
            condition
                .thresholds()
                .into_iter()
                .map(ThresholdValue::Number)
                .collect::<Vec<_>>()
        };
        match &self.shape {
            RuleShape::NumericSimple {
                aggregate,
                condition,
                ..
            } => {
                config.aggregate = Some(aggregate.kind());
                config.condition = Some(condition.kind());
                config.thresholds = numeric(condition);
            }
            RuleShape::NumericSemafor { aggregate, .. } => {
                config.aggregate = Some(aggregate.kind());
            }
            RuleShape::BinaryState {
                quantifier, target, ..
            } => {
                config.aggregate = Some(quantifier.kind());
                config.condition = Some(target.condition());
            }
            RuleShape::BinaryCount { condition, .. } => {
                config.aggregate = Some(AggregateKind::Count);
                config.condition = Some(condition.kind());
                config.thresholds = numeric(condition);
            }
            RuleShape::BinaryCountSemafor { .. } => {
                config.aggregate = Some(AggregateKind::Count);
            }
            RuleShape::TextMatch {
                quantifier,
                matcher,
                ..
            } => {
                config.aggregate = Some(quantifier.kind());
                config.condition = Some(matcher.condition_kind());
                config.thresholds = vec![ThresholdValue::Text(matcher.pattern.clone())];
                config.text_case_sensitive = matcher.case_sensitive;
                config.text_trim = matcher.trim;
            }
        }
        config
    }
}

impl TryFrom<RuleConfig> for RuleDefinition {
    type Error = RuleError;

    fn try_from(config: RuleConfig) -> RuleResult<Self> {
        let id = match config.rule_id.as_deref() {
            None | Some("") => return Err(RuleError::MissingField { field: "rule_id" }),
            Some(id) => RuleId::new(id)?,
        };
        let name = match config.name.as_deref().map(str::trim) {
            None | Some("") => return Err(RuleError::MissingField { field: "name" }),
            Some(name) => name.to_string(),
        };
        if config.entities.is_empty() {
            return Err(RuleError::NoEntities);
        }

        // Stored values below one second are clamped, matching what the
        // integration has always done with legacy entries.
        let interval_seconds = clamp_seconds(config.interval_seconds);
        let shape = match config.severity_mode {
            SeverityMode::Simple => simple_shape(&config, interval_seconds)?,
            SeverityMode::Semafor => semafor_shape(&config, interval_seconds)?,
        };

        Ok(Self {
            id,
            name,
            entities: config.entities,
            interval_seconds,
            latched: config.latched,
            unknown_handling: config.unknown_handling,
            notify: NotifyChannels {
                email: config.notify_email,
                mobile: config.notify_mobile,
            },
            shape,
        })
    }
}

fn clamp_seconds(value: i64) -> u32 {
    value.clamp(1, i64::from(u32::MAX)) as u32
}

fn unsupported(config: &RuleConfig) -> RuleError {
    let name = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    RuleError::UnsupportedCombination {
        data_type: enum_name(&config.data_type),
        aggregate: name(config.aggregate.as_ref().map(enum_name)),
        condition: name(config.condition.map(|c| c.as_str().to_string())),
        severity_mode: enum_name(&config.severity_mode),
    }
}

fn enum_name<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn simple_shape(config: &RuleConfig, interval_seconds: u32) -> RuleResult<RuleShape> {
    let trigger = SimpleTrigger {
        duration_seconds: clamp_seconds(config.duration_seconds),
        level: config.level,
    };
    if interval_seconds > trigger.duration_seconds {
        return Err(RuleError::IntervalExceedsDuration {
            interval: interval_seconds,
            duration: trigger.duration_seconds,
            scope: "rule".to_string(),
        });
    }

    let condition = config
        .condition
        .ok_or(RuleError::MissingField { field: "condition" })?;
    let aggregate = config
        .aggregate
        .ok_or(RuleError::MissingField { field: "aggregate" })?;

    match config.data_type {
        DataType::Numeric => {
            let aggregate = NumericAggregate::from_kind(aggregate).ok_or_else(|| unsupported(config))?;
            if !is_numeric_condition(condition) {
                return Err(unsupported(config));
            }
            Ok(RuleShape::NumericSimple {
                aggregate,
                condition: NumericCondition::from_parts(condition, &config.thresholds)?,
                trigger,
            })
        }
        DataType::Binary => match aggregate {
            AggregateKind::Count if is_numeric_condition(condition) => Ok(RuleShape::BinaryCount {
                condition: NumericCondition::from_parts(condition, &config.thresholds)?,
                trigger,
            }),
            AggregateKind::Any | AggregateKind::All => {
                let target = match condition {
                    ConditionKind::IsOn => BinaryTarget::On,
                    ConditionKind::IsOff => BinaryTarget::Off,
                    _ => return Err(unsupported(config)),
                };
                Ok(RuleShape::BinaryState {
                    quantifier: Quantifier::from_kind(aggregate).ok_or_else(|| unsupported(config))?,
                    target,
                    trigger,
                })
            }
            _ => Err(unsupported(config)),
        },
        DataType::Text => {
            let quantifier = Quantifier::from_kind(aggregate).ok_or_else(|| unsupported(config))?;
            let text_condition = match condition {
                ConditionKind::Contains => TextCondition::Contains,
                ConditionKind::Equals => TextCondition::Equals,
                _ => return Err(unsupported(config)),
            };
            let pattern = config
                .thresholds
                .first()
                .ok_or_else(|| RuleError::MissingThresholds {
                    condition: condition.as_str().to_string(),
                    required: 1,
                })?
                .to_string();
            Ok(RuleShape::TextMatch {
                quantifier,
                matcher: TextMatcher::new(
                    text_condition,
                    pattern,
                    config.text_case_sensitive,
                    config.text_trim,
                )?,
                trigger,
            })
        }
    }
}

fn is_numeric_condition(condition: ConditionKind) -> bool {
    matches!(
        condition,
        ConditionKind::Gt
            | ConditionKind::Gte
            | ConditionKind::Lt
            | ConditionKind::Lte
            | ConditionKind::Eq
            | ConditionKind::Between
    )
}

fn semafor_shape(config: &RuleConfig, interval_seconds: u32) -> RuleResult<RuleShape> {
    // Only shapes that reduce to a single number can escalate.
    let numeric_aggregate = match (config.data_type, config.aggregate) {
        (DataType::Numeric, None) => Some(NumericAggregate::Max),
        (DataType::Numeric, Some(kind)) => {
            Some(NumericAggregate::from_kind(kind).ok_or_else(|| unsupported(config))?)
        }
        (DataType::Binary, Some(AggregateKind::Count)) => None,
        _ => return Err(unsupported(config)),
    };

    let direction = config
        .direction
        .ok_or(RuleError::MissingField { field: "direction" })?;
    let ladder = build_ladder(config, direction, interval_seconds)?;

    Ok(match numeric_aggregate {
        Some(aggregate) => RuleShape::NumericSemafor { aggregate, ladder },
        None => RuleShape::BinaryCountSemafor { ladder },
    })
}

fn build_ladder(
    config: &RuleConfig,
    direction: Direction,
    interval_seconds: u32,
) -> RuleResult<SemaforLadder> {
    if config.levels.is_empty() {
        return Err(RuleError::SemaforLevelsRequired);
    }

    let mut levels: LevelMap<Option<LevelSpec>> = LevelMap::default();
    for (level, level_config) in &config.levels {
        if level_config.duration_seconds < 1 {
            return Err(RuleError::InvalidDuration {
                scope: level.to_string(),
                value: level_config.duration_seconds,
            });
        }
        let duration_seconds = clamp_seconds(level_config.duration_seconds);
        if interval_seconds > duration_seconds {
            return Err(RuleError::IntervalExceedsDuration {
                interval: interval_seconds,
                duration: duration_seconds,
                scope: level.to_string(),
            });
        }
        levels[*level] = Some(LevelSpec {
            threshold: level_config.threshold,
            duration_seconds,
        });
    }

    let thresholds: Vec<f64> = levels.configured().map(|(_, spec)| spec.threshold).collect();
    let (ordered, expected) = match direction {
        Direction::HigherIsWorse => (thresholds.windows(2).all(|w| w[0] < w[1]), "increasing"),
        Direction::LowerIsWorse => (thresholds.windows(2).all(|w| w[0] > w[1]), "decreasing"),
    };
    if !ordered {
        return Err(RuleError::SemaforOrder { expected });
    }

    Ok(SemaforLadder { direction, levels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use es_core::SeverityLevel;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> RuleResult<RuleDefinition> {
        let config: RuleConfig = serde_json::from_value(value)?;
        RuleDefinition::try_from(config)
    }

    #[test]
    fn test_numeric_simple_rule() {
        let rule = parse(json!({
            "rule_id": "pack_max",
            "name": "Pack max voltage",
            "entities": ["sensor.cell_1", "sensor.cell_2"],
            "aggregate": "max",
            "condition": "gt",
            "thresholds": [3.5],
            "duration_seconds": 5,
            "interval_seconds": 1,
            "level": "shutdown",
            "latched": true
        }))
        .unwrap();

        assert_eq!(rule.id.as_str(), "pack_max");
        assert!(rule.latched);
        match &rule.shape {
            RuleShape::NumericSimple {
                aggregate,
                condition,
                trigger,
            } => {
                assert_eq!(*aggregate, NumericAggregate::Max);
                assert_eq!(*condition, NumericCondition::Gt { threshold: 3.5 });
                assert_eq!(trigger.duration_seconds, 5);
                assert_eq!(trigger.level, SeverityLevel::Shutdown);
            }
            other => panic!("Expected NumericSimple, got {other:?}"),
        }
    }

    #[test]
    fn test_binary_shapes() {
        let state = parse(json!({
            "rule_id": "doors",
            "name": "Doors",
            "data_type": "binary",
            "entities": ["binary_sensor.a"],
            "aggregate": "any",
            "condition": "is_off"
        }))
        .unwrap();
        assert!(matches!(
            state.shape,
            RuleShape::BinaryState {
                quantifier: Quantifier::Any,
                target: BinaryTarget::Off,
                ..
            }
        ));

        let count = parse(json!({
            "rule_id": "leaks",
            "name": "Leaks",
            "data_type": "binary",
            "entities": ["binary_sensor.a", "binary_sensor.b"],
            "aggregate": "count",
            "condition": "gte",
            "thresholds": [2]
        }))
        .unwrap();
        assert!(matches!(count.shape, RuleShape::BinaryCount { .. }));
    }

    #[test]
    fn test_binary_any_with_numeric_condition_rejected() {
        let result = parse(json!({
            "rule_id": "bad",
            "name": "Bad",
            "data_type": "binary",
            "entities": ["binary_sensor.a"],
            "aggregate": "any",
            "condition": "gt",
            "thresholds": [1]
        }));
        assert!(matches!(result, Err(RuleError::UnsupportedCombination { .. })));
    }

    #[test]
    fn test_missing_id_and_name() {
        assert!(matches!(
            parse(json!({"name": "x", "entities": ["sensor.a"]})),
            Err(RuleError::MissingField { field: "rule_id" })
        ));
        assert!(matches!(
            parse(json!({"rule_id": "x", "name": "  ", "entities": ["sensor.a"]})),
            Err(RuleError::MissingField { field: "name" })
        ));
        assert!(matches!(
            parse(json!({"rule_id": "x", "name": "X"})),
            Err(RuleError::NoEntities)
        ));
    }

    #[test]
    fn test_interval_longer_than_duration_rejected() {
        let result = parse(json!({
            "rule_id": "slow",
            "name": "Slow",
            "entities": ["sensor.a"],
            "aggregate": "max",
            "condition": "gt",
            "thresholds": [1],
            "duration_seconds": 2,
            "interval_seconds": 5
        }));
        assert!(matches!(
            result,
            Err(RuleError::IntervalExceedsDuration {
                interval: 5,
                duration: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_durations_clamped_to_one_second() {
        let rule = parse(json!({
            "rule_id": "fast",
            "name": "Fast",
            "entities": ["sensor.a"],
            "aggregate": "min",
            "condition": "lt",
            "thresholds": [1],
            "duration_seconds": 0,
            "interval_seconds": 0
        }))
        .unwrap();
        assert_eq!(rule.interval_seconds, 1);
        assert_eq!(rule.shape.trigger().unwrap().duration_seconds, 1);
    }

    #[test]
    fn test_semafor_rule() {
        let rule = parse(json!({
            "rule_id": "cell_semafor",
            "name": "Cell voltage",
            "entities": ["sensor.cell"],
            "severity_mode": "semafor",
            "direction": "higher_is_worse",
            "levels": {
                "notify": {"threshold": 3.5, "duration_seconds": 1},
                "limit": {"threshold": 3.6, "duration_seconds": 1},
                "shutdown": {"threshold": 3.8, "duration_seconds": 1}
            }
        }))
        .unwrap();

        let ladder = rule.shape.ladder().unwrap();
        assert_eq!(ladder.configured().count(), 3);
        assert!(matches!(
            rule.shape,
            RuleShape::NumericSemafor {
                aggregate: NumericAggregate::Max,
                ..
            }
        ));
    }

    #[test]
    fn test_semafor_order_must_follow_direction() {
        let result = parse(json!({
            "rule_id": "uv",
            "name": "Under voltage",
            "entities": ["sensor.cell"],
            "severity_mode": "semafor",
            "direction": "lower_is_worse",
            "levels": {
                "notify": {"threshold": 2.6, "duration_seconds": 1},
                "shutdown": {"threshold": 3.0, "duration_seconds": 1}
            }
        }));
        assert!(matches!(
            result,
            Err(RuleError::SemaforOrder {
                expected: "decreasing"
            })
        ));

        let equal = parse(json!({
            "rule_id": "flat",
            "name": "Flat",
            "entities": ["sensor.cell"],
            "severity_mode": "semafor",
            "direction": "higher_is_worse",
            "levels": {
                "notify": {"threshold": 3.0, "duration_seconds": 1},
                "limit": {"threshold": 3.0, "duration_seconds": 1}
            }
        }));
        assert!(matches!(equal, Err(RuleError::SemaforOrder { .. })));
    }

    #[test]
    fn test_semafor_interval_checked_against_each_level() {
        let result = parse(json!({
            "rule_id": "semafor_interval",
            "name": "Semafor interval",
            "entities": ["sensor.cell"],
            "severity_mode": "semafor",
            "direction": "higher_is_worse",
            "interval_seconds": 3,
            "levels": {
                "notify": {"threshold": 3.5, "duration_seconds": 5},
                "limit": {"threshold": 3.6, "duration_seconds": 2}
            }
        }));
        assert!(matches!(
            result,
            Err(RuleError::IntervalExceedsDuration { duration: 2, .. })
        ));
    }

    #[test]
    fn test_semafor_not_supported_for_text() {
        let result = parse(json!({
            "rule_id": "text_semafor",
            "name": "Text",
            "data_type": "text",
            "entities": ["sensor.status"],
            "aggregate": "any",
            "severity_mode": "semafor",
            "direction": "higher_is_worse",
            "levels": {"notify": {"threshold": 1, "duration_seconds": 1}}
        }));
        assert!(matches!(result, Err(RuleError::UnsupportedCombination { .. })));
    }

    #[test]
    fn test_to_config_round_trip_for_text_rule() {
        let rule = parse(json!({
            "rule_id": "status",
            "name": "Inverter status",
            "data_type": "text",
            "entities": ["sensor.inverter"],
            "aggregate": "any",
            "condition": "contains",
            "thresholds": ["fault"],
            "duration_seconds": 3,
            "text_case_sensitive": true,
            "text_trim": false,
            "notify_mobile": false
        }))
        .unwrap();

        let config = rule.to_config();
        assert_eq!(config.condition, Some(ConditionKind::Contains));
        assert_eq!(config.thresholds, vec![ThresholdValue::Text("fault".into())]);
        assert!(config.text_case_sensitive);
        assert!(!config.text_trim);
        assert!(!config.notify_mobile);
        assert_eq!(RuleDefinition::try_from(config).unwrap(), rule);
    }
}
