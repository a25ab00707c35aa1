//! Simulated severity override

use chrono::{DateTime, Utc};
use es_core::SeverityLevel;
use es_engine::{ActiveEvent, EventValue, GlobalSeverityState};
use serde::Serialize;

pub const SIMULATION_RULE_ID: &str = "simulation";
pub const SIMULATION_DATA_TYPE: &str = "simulation";
const DEFAULT_REASON: &str = "Simulation";

/// Parameters of a `simulate_level` call
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRequest {
    /// `None` means normal, which clears any running simulation
    pub level: Option<SeverityLevel>,
    pub duration_seconds: Option<i64>,
    pub reason: Option<String>,
    pub detail: Option<String>,
    pub entity_id: Option<String>,
    pub value: Option<EventValue>,
    pub send_notifications: bool,
    pub send_email: bool,
}

impl SimulationRequest {
    pub fn new(level: Option<SeverityLevel>) -> Self {
        Self {
            level,
            duration_seconds: None,
            reason: None,
            detail: None,
            entity_id: None,
            value: None,
            send_notifications: true,
            send_email: false,
        }
    }

    pub fn with_duration(mut self, seconds: i64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>, value: EventValue) -> Self {
        self.entity_id = Some(entity_id.into());
        self.value = Some(value);
        self
    }

    pub fn without_notifications(mut self) -> Self {
        self.send_notifications = false;
        self
    }
}

/// A running simulation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationState {
    pub level: SeverityLevel,
    pub reason: String,
    pub detail: Option<String>,
    pub entity_id: Option<String>,
    pub value: Option<EventValue>,
    pub started_at: DateTime<Utc>,
    pub expires_at_monotonic: Option<f64>,
    pub send_notifications: bool,
}

impl SimulationState {
    /// Start a simulation at `level`; `duration` must already be validated
    pub fn start(
        level: SeverityLevel,
        request: &SimulationRequest,
        duration: Option<u64>,
        monotonic: f64,
        wall: DateTime<Utc>,
    ) -> Self {
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REASON)
            .to_string();
        Self {
            level,
            reason,
            detail: request.detail.clone(),
            entity_id: request.entity_id.clone(),
            value: request.value.clone(),
            started_at: wall,
            expires_at_monotonic: duration.map(|d| monotonic + d as f64),
            send_notifications: request.send_notifications,
        }
    }

    pub fn is_expired(&self, monotonic: f64) -> bool {
        self.expires_at_monotonic
            .is_some_and(|deadline| monotonic >= deadline)
    }

    pub fn detail(&self) -> String {
        self.detail
            .clone()
            .unwrap_or_else(|| format!("Simulation: {}", self.reason))
    }

    /// Published state while the simulation runs: one synthetic event
    pub fn to_global_state(&self, now: DateTime<Utc>) -> GlobalSeverityState {
        let detail = self.detail();
        let event = ActiveEvent {
            rule_id: SIMULATION_RULE_ID.to_string(),
            reason: self.reason.clone(),
            level: self.level,
            entity_id: self.entity_id.clone(),
            value: self.value.clone(),
            detail: detail.clone(),
            latched: false,
            notify_email: true,
            notify_mobile: true,
            first_seen: Some(self.started_at),
            last_seen: Some(now),
            data_type: SIMULATION_DATA_TYPE.to_string(),
        };
        GlobalSeverityState {
            active: true,
            level: Some(self.level),
            primary_reason: Some(self.reason.clone()),
            primary_level: Some(self.level),
            primary_entity: self.entity_id.clone(),
            primary_value: self.value.clone(),
            primary_detail: Some(detail),
            active_events: vec![event],
            acknowledged: false,
            last_update: Some(now),
            latched_since: Some(self.started_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wall() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_defaults_and_synthetic_event() {
        let request = SimulationRequest::new(Some(SeverityLevel::Limit));
        let simulation =
            SimulationState::start(SeverityLevel::Limit, &request, None, 10.0, wall());
        assert_eq!(simulation.reason, "Simulation");
        assert!(!simulation.is_expired(1e9));

        let state = simulation.to_global_state(wall());
        assert!(state.active);
        assert_eq!(state.level, Some(SeverityLevel::Limit));
        assert_eq!(state.primary_detail.as_deref(), Some("Simulation: Simulation"));
        assert_eq!(state.active_events.len(), 1);
        assert_eq!(state.active_events[0].rule_id, "simulation");
        assert_eq!(state.active_events[0].data_type, "simulation");
        assert_eq!(state.latched_since, Some(wall()));
    }

    #[test]
    fn test_expiry_by_monotonic_deadline() {
        let request = SimulationRequest::new(Some(SeverityLevel::Shutdown))
            .with_reason("Drill")
            .with_entity("sensor.pack_voltage", EventValue::Number(58.2));
        let simulation =
            SimulationState::start(SeverityLevel::Shutdown, &request, Some(30), 100.0, wall());
        assert!(!simulation.is_expired(129.9));
        assert!(simulation.is_expired(130.0));

        let state = simulation.to_global_state(wall());
        assert_eq!(state.primary_reason.as_deref(), Some("Drill"));
        assert_eq!(state.primary_entity.as_deref(), Some("sensor.pack_voltage"));
        assert_eq!(state.primary_value, Some(EventValue::Number(58.2)));
    }
}
