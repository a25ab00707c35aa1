//! Async layer around the Emergency Stop rule engine
//!
//! The [`Coordinator`] runs ticks on a timer, gates them with the simulation
//! override and turns changes of the channel views into email and mobile
//! notifications. Transports plug in through the [`Notifier`] trait.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod notify;
pub mod report;
pub mod simulation;

pub use config::{
    EmailSettings, IntegrationConfig, MobileSettings, NotificationSettings,
    DEFAULT_NOTIFICATION_TIMEOUT_SECONDS,
};
pub use coordinator::{Coordinator, SharedLookup};
pub use error::{ConfigError, ConfigResult};
pub use notify::{
    DispatchSummary, EmailMessage, MobileMessage, Notification, Notifier, TracingNotifier,
};
pub use report::{build_report, build_rules_export, ReportSource};
pub use simulation::{SimulationRequest, SimulationState, SIMULATION_RULE_ID};
