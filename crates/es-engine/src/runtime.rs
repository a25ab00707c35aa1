//! Per-rule runtime state machine
//!
//! Single-level rules move `inactive -> pending -> active`: a violation streak
//! starts on the first matching evaluation and the rule activates once the
//! streak has lasted `duration_seconds`. Escalation rules run the same
//! debounce independently for every configured level and expose the highest
//! level past its duration.

use chrono::{DateTime, Utc};
use es_core::{LevelMap, SeverityLevel, Tick};
use es_rules::{RuleDefinition, SemaforLadder, SimpleTrigger};
use serde::Serialize;

use crate::aggregate::AggregateValue;

/// Externally visible effect of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Activated,
    Deactivated,
    /// The reported level of an already active escalation rule moved
    LevelChanged {
        from: SeverityLevel,
        to: SeverityLevel,
    },
}

/// Mutable evaluation state of one rule
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleRuntimeState {
    pub active: bool,
    pub active_since: Option<DateTime<Utc>>,
    /// Wall time of the last evaluation
    pub last_update: Option<DateTime<Utc>>,
    /// Monotonic time of the last evaluation, drives interval gating
    pub last_eval_monotonic: Option<f64>,
    /// Start of the current violation streak
    pub violation_started_at: Option<f64>,
    pub last_match: Option<bool>,
    pub last_aggregate: Option<AggregateValue>,
    pub last_entity: Option<String>,
    pub last_detail: Option<String>,
    pub last_invalid_reason: Option<&'static str>,

    // Escalation rules only
    pub current_level: Option<SeverityLevel>,
    pub latched_level: Option<SeverityLevel>,
    pub level_violation_started_at: LevelMap<Option<f64>>,
    pub level_active_since: LevelMap<Option<DateTime<Utc>>>,
    pub active_levels: Vec<SeverityLevel>,
}

impl RuleRuntimeState {
    /// Back to inactive with no history
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Level this rule currently contributes to the global state
    pub fn active_level(&self, rule: &RuleDefinition) -> Option<SeverityLevel> {
        if !self.active {
            return None;
        }
        match rule.shape.trigger() {
            Some(trigger) => Some(trigger.level),
            None => self.current_level,
        }
    }

    /// Advance a single-level rule by one evaluation
    ///
    /// A `None` match leaves the streak and the active flag untouched.
    pub fn apply_simple(
        &mut self,
        matched: Option<bool>,
        trigger: &SimpleTrigger,
        latched: bool,
        tick: &Tick,
    ) -> Transition {
        self.last_match = matched;
        let was_active = self.active;

        match matched {
            None => return Transition::Unchanged,
            Some(true) => {
                let started_at = *self.violation_started_at.get_or_insert(tick.monotonic);
                if tick.monotonic - started_at >= f64::from(trigger.duration_seconds)
                    && !self.active
                {
                    self.active = true;
                    self.active_since = Some(tick.wall);
                }
            }
            Some(false) => {
                self.violation_started_at = None;
                if !latched {
                    self.active = false;
                    self.active_since = None;
                }
            }
        }

        match (was_active, self.active) {
            (false, true) => Transition::Activated,
            (true, false) => Transition::Deactivated,
            _ => Transition::Unchanged,
        }
    }

    /// Advance an escalation rule given the match of every configured level
    ///
    /// A level whose match is `None` keeps its streak and its active state.
    pub fn apply_semafor(
        &mut self,
        ladder: &SemaforLadder,
        matches: &LevelMap<Option<bool>>,
        latched: bool,
        tick: &Tick,
    ) -> Transition {
        let previous_level = self.current_level;
        let previously_active = self.active_levels.clone();
        let mut active_levels = Vec::new();

        for (level, spec) in ladder.configured() {
            match matches[level] {
                Some(true) => {
                    let started_at =
                        *self.level_violation_started_at[level].get_or_insert(tick.monotonic);
                    if tick.monotonic - started_at >= f64::from(spec.duration_seconds) {
                        self.level_active_since[level].get_or_insert(tick.wall);
                        active_levels.push(level);
                    }
                }
                Some(false) => {
                    self.level_violation_started_at[level] = None;
                    if !latched {
                        self.level_active_since[level] = None;
                    }
                }
                None => {
                    if previously_active.contains(&level) {
                        active_levels.push(level);
                    }
                }
            }
        }

        let highest = active_levels.iter().copied().max();
        self.active_levels = active_levels;

        if latched {
            if highest.is_some() {
                self.latched_level = self.latched_level.max(highest);
            }
            self.current_level = self.latched_level;
        } else {
            self.current_level = highest;
        }
        self.active = self.current_level.is_some();
        self.active_since = self
            .current_level
            .and_then(|level| self.level_active_since[level]);

        match (previous_level, self.current_level) {
            (None, Some(_)) => Transition::Activated,
            (Some(_), None) => Transition::Deactivated,
            (Some(from), Some(to)) if from != to => Transition::LevelChanged { from, to },
            _ => Transition::Unchanged,
        }
    }
}
