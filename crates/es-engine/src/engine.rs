//! The rule engine: scheduling, evaluation and aggregation per tick

use es_core::{Clock, LevelMap, RuleId, StateLookup, Tick};
use es_rules::{RuleDefinition, RuleSet, SemaforLadder};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::collector::Collector;
use crate::condition::unknown_match;
use crate::evaluate::{evaluate_simple, read_scalar};
use crate::runtime::{RuleRuntimeState, Transition};
use crate::schedule::{is_due, seed_last_eval, tick_interval};
use crate::severity::{collect_events, Channel, GlobalSeverityState};

/// Evaluates a fixed rule set against a value provider
///
/// The engine owns all runtime state. It is driven by calling
/// [`evaluate_tick`](Self::evaluate_tick) serially; nothing inside it blocks
/// or performs I/O.
pub struct RuleEngine {
    rules: Vec<RuleDefinition>,
    states: IndexMap<RuleId, RuleRuntimeState>,
    collector: Collector,
    clock: Arc<dyn Clock>,
    acknowledged: bool,
    global: GlobalSeverityState,
    email_view: GlobalSeverityState,
    mobile_view: GlobalSeverityState,
}

impl RuleEngine {
    pub fn new(rules: Vec<RuleDefinition>, clock: Arc<dyn Clock>) -> Self {
        let tick = clock.tick();
        let mut engine = Self {
            rules: Vec::new(),
            states: IndexMap::new(),
            collector: Collector::new(),
            clock,
            acknowledged: false,
            global: GlobalSeverityState::normal(tick.wall),
            email_view: GlobalSeverityState::normal(tick.wall),
            mobile_view: GlobalSeverityState::normal(tick.wall),
        };
        engine.install_rules(rules, &tick);
        engine
    }

    pub fn from_rule_set(rule_set: RuleSet, clock: Arc<dyn Clock>) -> Self {
        Self::new(rule_set.into_rules(), clock)
    }

    /// Replace the whole rule set; all runtime history is dropped
    pub fn replace_rules(&mut self, rules: Vec<RuleDefinition>) {
        let tick = self.clock.tick();
        self.install_rules(rules, &tick);
        self.acknowledged = false;
        self.publish_normal(&tick);
        info!("Replaced rule set with {} rule(s)", self.rules.len());
    }

    fn install_rules(&mut self, rules: Vec<RuleDefinition>, tick: &Tick) {
        self.states = rules
            .iter()
            .map(|rule| {
                let state = RuleRuntimeState {
                    last_eval_monotonic: Some(seed_last_eval(
                        rule.id.as_str(),
                        rule.interval_seconds,
                        tick.monotonic,
                    )),
                    ..Default::default()
                };
                (rule.id.clone(), state)
            })
            .collect();
        self.rules = rules;
    }

    /// Evaluate every due rule, then rebuild the global state and channel views
    #[instrument(skip(self, lookup), fields(rules = self.rules.len()))]
    pub fn evaluate_tick(&mut self, lookup: &dyn StateLookup) {
        let tick = self.clock.tick();
        let mut evaluated = 0usize;

        for rule in &self.rules {
            let Some(state) = self.states.get_mut(&rule.id) else {
                continue;
            };
            if !is_due(state, rule.interval_seconds, tick.monotonic) {
                continue;
            }

            state.last_eval_monotonic = Some(tick.monotonic);
            state.last_update = Some(tick.wall);
            evaluated += 1;

            let transition = match rule.shape.ladder() {
                Some(ladder) => evaluate_semafor(rule, ladder, state, &mut self.collector, lookup, &tick),
                None => {
                    let outcome = evaluate_simple(rule, &mut self.collector, lookup);
                    state.last_aggregate = outcome.aggregate;
                    state.last_entity = outcome.entity_id;
                    state.last_detail = Some(outcome.detail);
                    state.last_invalid_reason = outcome.invalid_reason;
                    match rule.shape.trigger() {
                        Some(trigger) => state.apply_simple(outcome.matched, trigger, rule.latched, &tick),
                        None => Transition::Unchanged,
                    }
                }
            };
            log_transition(rule, state, transition);
        }

        self.rebuild_views(&tick);
        debug!(
            evaluated,
            level = self.global.level_name(),
            events = self.global.active_events.len(),
            "Tick evaluated"
        );
    }

    fn rebuild_views(&mut self, tick: &Tick) {
        let build = |channel: Channel, previous: &GlobalSeverityState| {
            GlobalSeverityState::from_events(
                collect_events(&self.rules, &self.states, channel),
                self.acknowledged,
                previous,
                tick.wall,
            )
        };
        let global = build(Channel::All, &self.global);
        let email_view = build(Channel::Email, &self.email_view);
        let mobile_view = build(Channel::Mobile, &self.mobile_view);

        self.global = global;
        self.email_view = email_view;
        self.mobile_view = mobile_view;
        if !self.global.active {
            self.acknowledged = false;
        }
    }

    fn publish_normal(&mut self, tick: &Tick) {
        self.global = GlobalSeverityState::normal(tick.wall);
        self.email_view = GlobalSeverityState::normal(tick.wall);
        self.mobile_view = GlobalSeverityState::normal(tick.wall);
    }

    /// Clear every rule's runtime state and publish a normal state
    pub fn reset_all(&mut self) {
        for state in self.states.values_mut() {
            state.reset();
        }
        self.acknowledged = false;
        let tick = self.clock.tick();
        self.publish_normal(&tick);
        info!("Reset all {} rule state(s)", self.states.len());
    }

    /// Mark the current condition as acknowledged without changing severity
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
        self.global.acknowledged = true;
        self.global.last_update = Some(self.clock.wall_clock());
        info!(level = self.global.level_name(), "Acknowledged");
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn global_state(&self) -> &GlobalSeverityState {
        &self.global
    }

    /// Global state restricted to the rules of one channel
    pub fn channel_state(&self, channel: Channel) -> &GlobalSeverityState {
        match channel {
            Channel::All => &self.global,
            Channel::Email => &self.email_view,
            Channel::Mobile => &self.mobile_view,
        }
    }

    pub fn rule_states(&self) -> &IndexMap<RuleId, RuleRuntimeState> {
        &self.states
    }

    pub fn rule_state(&self, rule_id: &RuleId) -> Option<&RuleRuntimeState> {
        self.states.get(rule_id)
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    /// Seconds between ticks needed to serve the fastest rule
    pub fn tick_interval(&self) -> u32 {
        tick_interval(&self.rules)
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

fn evaluate_semafor(
    rule: &RuleDefinition,
    ladder: &SemaforLadder,
    state: &mut RuleRuntimeState,
    collector: &mut Collector,
    lookup: &dyn StateLookup,
    tick: &Tick,
) -> Transition {
    let reading = read_scalar(rule, collector, lookup);

    let matches: LevelMap<Option<bool>> = match &reading {
        Ok(reading) => {
            let value = reading.value.as_f64();
            LevelMap::from_fn(|level| {
                ladder.levels[level]
                    .as_ref()
                    .map(|spec| ladder.level_matches(spec, value))
            })
        }
        Err(_) => {
            let forced = unknown_match(rule.unknown_handling);
            LevelMap::from_fn(|level| ladder.levels[level].as_ref().and(forced))
        }
    };

    match &reading {
        Ok(reading) => {
            state.last_aggregate = Some(reading.value);
            state.last_entity = reading.entity_id.clone();
            state.last_invalid_reason = None;
        }
        Err(reason) => {
            state.last_aggregate = None;
            state.last_entity = None;
            state.last_invalid_reason = Some(*reason);
            state.last_detail = Some(format!("{}: {}", rule.name, reason));
        }
    }

    let transition = state.apply_semafor(ladder, &matches, rule.latched, tick);

    if let (Ok(reading), Some(level)) = (&reading, state.current_level) {
        if let Some(spec) = &ladder.levels[level] {
            state.last_detail = Some(format!(
                "{}: {} {} {} {}",
                rule.name,
                level,
                reading.value,
                ladder.direction.comparator(),
                spec.threshold
            ));
        }
    }
    transition
}

fn log_transition(rule: &RuleDefinition, state: &RuleRuntimeState, transition: Transition) {
    match transition {
        Transition::Unchanged => {}
        Transition::Activated => info!(
            rule_id = %rule.id,
            level = ?state.active_level(rule),
            "Rule {} activated: {}",
            rule.name,
            state.last_detail.as_deref().unwrap_or("")
        ),
        Transition::Deactivated => info!(rule_id = %rule.id, "Rule {} cleared", rule.name),
        Transition::LevelChanged { from, to } => info!(
            rule_id = %rule.id,
            "Rule {} level changed: {} -> {}",
            rule.name,
            from,
            to
        ),
    }
}
