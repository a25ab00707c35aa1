//! Tick driver around the rule engine
//!
//! The [`Coordinator`] owns one [`RuleEngine`] behind an async mutex and is
//! the only caller of `evaluate_tick`, so ticks never overlap. Everything
//! with side effects happens here: the simulation gate before evaluation,
//! notification planning after it, and dispatch once the lock is released.

use es_core::{Clock, RuleId, SeverityLevel, StateLookup};
use es_engine::{Channel, GlobalSeverityState, RuleEngine, RuleRuntimeState};
use es_rules::{RuleDefinition, RuleSet};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::config::{IntegrationConfig, NotificationSettings};
use crate::notify::{
    dispatch, mobile_title, notify_service, plan_activation_email, plan_level_change,
    report_email, DispatchSummary, MobileMessage, Notification, Notifier,
};
use crate::report::{build_report, build_rules_export, ReportSource};
use crate::simulation::{SimulationRequest, SimulationState};

/// Value provider shared with the driver task
pub type SharedLookup = Arc<dyn StateLookup + Send + Sync>;

struct DriverState {
    engine: RuleEngine,
    /// State shown to sensors and reports; the simulation replaces it
    published: GlobalSeverityState,
    simulation: Option<SimulationState>,
    /// Mobile view level after the previous tick; `None` before the first
    last_mobile_level: Option<Option<SeverityLevel>>,
    last_email_active: bool,
    suppress_level_notification: bool,
}

impl DriverState {
    fn new(engine: RuleEngine) -> Self {
        let published = engine.global_state().clone();
        Self {
            engine,
            published,
            simulation: None,
            last_mobile_level: None,
            last_email_active: false,
            suppress_level_notification: false,
        }
    }
}

/// Drives rule evaluation and its side effects
#[derive(Clone)]
pub struct Coordinator {
    state: Arc<Mutex<DriverState>>,
    lookup: SharedLookup,
    notifier: Arc<dyn Notifier>,
    settings: Arc<NotificationSettings>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
}

impl Coordinator {
    pub fn new(
        rule_set: RuleSet,
        settings: NotificationSettings,
        lookup: SharedLookup,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let engine = RuleEngine::from_rule_set(rule_set, clock);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            state: Arc::new(Mutex::new(DriverState::new(engine))),
            lookup,
            notifier,
            settings: Arc::new(settings),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Build from a loaded integration config; invalid rules are skipped
    pub fn from_config(
        config: &IntegrationConfig,
        lookup: SharedLookup,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            config.rule_set(),
            config.notifications.clone(),
            lookup,
            notifier,
            clock,
        )
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.notification_timeout_seconds)
    }

    /// Run one tick and return the published state
    ///
    /// While a simulation runs, real evaluation is skipped. Notifications are
    /// sent after the engine state is final; their failures are only logged.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> GlobalSeverityState {
        let (published, notifications) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let tick = state.engine.clock().tick();

            if let Some(simulation) = &state.simulation {
                if !simulation.is_expired(tick.monotonic) {
                    state.published = simulation.to_global_state(tick.wall);
                    return state.published.clone();
                }
                let send_notifications = simulation.send_notifications;
                info!(level = simulation.level.as_str(), "Simulation expired");
                state.simulation = None;
                if !send_notifications {
                    state.suppress_level_notification = true;
                }
            }

            state.engine.evaluate_tick(self.lookup.as_ref());
            state.published = state.engine.global_state().clone();
            let notifications = self.plan_tick_notifications(state);
            (state.published.clone(), notifications)
        };

        self.send(notifications).await;
        published
    }

    fn plan_tick_notifications(&self, state: &mut DriverState) -> Vec<Notification> {
        let mut notifications = Vec::new();

        let (email, email_active) = {
            let view: &DriverState = state;
            let email_view = view.engine.channel_state(Channel::Email);
            let email = plan_activation_email(
                view.last_email_active,
                email_view,
                &self.settings.email,
                || self.report_from(view),
            );
            (email, email_view.active)
        };
        notifications.extend(email.map(Notification::Email));
        state.last_email_active = email_active;

        let mobile_view = state.engine.channel_state(Channel::Mobile);
        let current = mobile_view.level;
        match state.last_mobile_level {
            None => {}
            Some(_) if state.suppress_level_notification => {
                debug!("Level change notification suppressed after simulation");
                state.suppress_level_notification = false;
            }
            Some(previous) => {
                notifications.extend(
                    plan_level_change(previous, current, mobile_view, &self.settings.mobile)
                        .into_iter()
                        .map(Notification::Mobile),
                );
            }
        }
        state.last_mobile_level = Some(current);

        notifications
    }

    async fn send(&self, notifications: Vec<Notification>) -> DispatchSummary {
        if notifications.is_empty() {
            return DispatchSummary::default();
        }
        debug!("Dispatching {} notification(s)", notifications.len());
        dispatch(
            self.notifier.as_ref(),
            &notifications,
            self.notification_timeout(),
        )
        .await
    }

    /// Override the published state with a synthetic event
    ///
    /// A `normal` level clears a running simulation instead.
    pub async fn simulate_level(&self, request: SimulationRequest) {
        let duration = match request.duration_seconds {
            Some(seconds) if seconds < 1 => {
                warn!(
                    "Simulation duration must be at least 1 second, got {}; running without expiry",
                    seconds
                );
                None
            }
            Some(seconds) => u64::try_from(seconds).ok(),
            None => None,
        };

        let Some(level) = request.level else {
            self.clear_simulation(request.send_notifications).await;
            return;
        };

        let notifications = {
            let mut state = self.state.lock().await;
            let tick = state.engine.clock().tick();
            let previous = state.last_mobile_level.flatten();

            let simulation =
                SimulationState::start(level, &request, duration, tick.monotonic, tick.wall);
            info!(
                level = level.as_str(),
                reason = %simulation.reason,
                duration_seconds = ?duration,
                "Simulation started"
            );
            state.published = simulation.to_global_state(tick.wall);
            state.simulation = Some(simulation);
            state.last_mobile_level = Some(Some(level));

            let mut notifications = Vec::new();
            if request.send_notifications {
                let messages = plan_level_change(
                    previous,
                    Some(level),
                    &state.published,
                    &self.settings.mobile,
                );
                notifications.extend(messages.into_iter().map(Notification::Mobile));
            }
            if request.send_email {
                let report = self.report_from(&state);
                match report_email(Some(level), &self.settings.email, &report) {
                    Some(email) => notifications.push(Notification::Email(email)),
                    None => debug!(level = level.as_str(), "Email disabled for simulated level"),
                }
            }
            notifications
        };

        self.send(notifications).await;
    }

    /// End a running simulation and re-evaluate immediately
    ///
    /// With `send_notifications` off, the level change caused by returning to
    /// real evaluation is not announced.
    pub async fn clear_simulation(&self, send_notifications: bool) {
        {
            let mut state = self.state.lock().await;
            if state.simulation.take().is_none() {
                return;
            }
            info!("Simulation cleared");
            if !send_notifications {
                state.suppress_level_notification = true;
            }
        }
        self.refresh().await;
    }

    pub async fn is_simulating(&self) -> bool {
        self.state.lock().await.simulation.is_some()
    }

    /// Mark the current condition as seen
    pub async fn acknowledge(&self) {
        let mut state = self.state.lock().await;
        state.engine.acknowledge();
        let engine_state = state.engine.global_state();
        let (acknowledged, last_update) = (engine_state.acknowledged, engine_state.last_update);
        state.published.acknowledged = acknowledged;
        state.published.last_update = last_update;
    }

    /// Clear every rule's runtime state and publish a normal state
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.engine.reset_all();
        state.published = state.engine.global_state().clone();
    }

    /// Swap in a new rule set; runtime history and notification edges restart
    pub async fn replace_rules(&self, rule_set: RuleSet) {
        let mut state = self.state.lock().await;
        state.engine.replace_rules(rule_set.into_rules());
        state.published = state.engine.global_state().clone();
        state.simulation = None;
        state.last_mobile_level = None;
        state.last_email_active = false;
        state.suppress_level_notification = false;
    }

    /// Send a mobile notification without any state change
    pub async fn send_test_notification(
        &self,
        level: Option<SeverityLevel>,
        message: Option<String>,
        urgent: Option<bool>,
        targets: Option<Vec<String>>,
    ) -> DispatchSummary {
        let mobile = &self.settings.mobile;
        let targets = targets.unwrap_or_else(|| mobile.targets_for(level).to_vec());
        let urgent = urgent.unwrap_or_else(|| mobile.urgent_for(level));
        let level_name = SeverityLevel::name_or_normal(level);
        if targets.is_empty() {
            debug!("No mobile notification targets configured for {}", level_name);
            return DispatchSummary::default();
        }

        let title = mobile_title(level);
        let body = message.unwrap_or_else(|| format!("Test notification for level {level_name}"));
        let notifications: Vec<Notification> = targets
            .iter()
            .filter_map(|target| notify_service(target))
            .map(|target| {
                Notification::Mobile(MobileMessage {
                    target,
                    title: title.clone(),
                    message: body.clone(),
                    urgent,
                })
            })
            .collect();
        self.send(notifications).await
    }

    pub async fn global_state(&self) -> GlobalSeverityState {
        self.state.lock().await.published.clone()
    }

    pub async fn rule_states(&self) -> IndexMap<RuleId, RuleRuntimeState> {
        self.state.lock().await.engine.rule_states().clone()
    }

    pub async fn rules(&self) -> Vec<RuleDefinition> {
        self.state.lock().await.engine.rules().to_vec()
    }

    /// Diagnostic report of the current state
    pub async fn report(&self) -> Value {
        let state = self.state.lock().await;
        self.report_from(&state)
    }

    fn report_from(&self, state: &DriverState) -> Value {
        let source = ReportSource {
            rules: state.engine.rules(),
            states: state.engine.rule_states(),
            published: &state.published,
            settings: &self.settings,
            lookup: self.lookup.as_ref(),
        };
        build_report(&source, state.engine.clock().wall_clock())
    }

    /// Loaded rules as a versioned export document
    pub async fn export_rules(&self) -> Value {
        let state = self.state.lock().await;
        build_rules_export(state.engine.rules(), state.engine.clock().wall_clock())
    }

    pub async fn tick_interval(&self) -> Duration {
        let seconds = self.state.lock().await.engine.tick_interval();
        Duration::from_secs(u64::from(seconds))
    }

    /// Start the periodic tick loop
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Coordinator already running");
            return;
        }

        let period = self.tick_interval().await;
        info!("Starting coordinator, tick every {}s", period.as_secs());

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let coordinator = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        coordinator.refresh().await;
                        let next = coordinator.tick_interval().await;
                        if next != ticker.period() {
                            debug!("Tick interval changed to {}s", next.as_secs());
                            ticker = tokio::time::interval_at(tokio::time::Instant::now() + next, next);
                            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            coordinator.running.store(false, Ordering::SeqCst);
            info!("Coordinator stopped");
        });
    }

    /// Stop the tick loop
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        info!("Stopping coordinator");
        let _ = self.shutdown_tx.send(());
    }

    /// Check if the tick loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
