//! Notification planning and dispatch
//!
//! Planning is pure: it turns state changes into messages. Sending goes
//! through a [`Notifier`]; all sends of one tick run concurrently under a
//! single timeout and their failures are only logged.

use async_trait::async_trait;
use es_core::SeverityLevel;
use es_engine::GlobalSeverityState;
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{EmailSettings, MobileSettings};

/// An email to one recipient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub recipient: String,
    pub level: Option<SeverityLevel>,
    pub subject: String,
    pub body: String,
}

/// A push notification to one notify target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MobileMessage {
    pub target: String,
    pub title: String,
    pub message: String,
    pub urgent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum Notification {
    Email(EmailMessage),
    Mobile(MobileMessage),
}

/// Transport for outgoing notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> anyhow::Result<()>;

    async fn send_mobile(&self, message: &MobileMessage) -> anyhow::Result<()>;
}

/// Notifier that only writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_email(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            recipient = %message.recipient,
            level = SeverityLevel::name_or_normal(message.level),
            "Email: {}",
            message.subject
        );
        Ok(())
    }

    async fn send_mobile(&self, message: &MobileMessage) -> anyhow::Result<()> {
        info!(
            target_service = %message.target,
            urgent = message.urgent,
            "{}: {}",
            message.title,
            message.message.replace('\n', " | ")
        );
        Ok(())
    }
}

/// Title used for mobile notifications about `level`
pub fn mobile_title(level: Option<SeverityLevel>) -> String {
    format!("Emergency Stop [{}]", SeverityLevel::name_or_normal(level))
}

/// `LEVEL CHANGED: a -> b` followed by the primary cause
pub fn format_level_change_message(
    previous: Option<SeverityLevel>,
    current: Option<SeverityLevel>,
    state: &GlobalSeverityState,
) -> String {
    let mut lines = vec![format!(
        "LEVEL CHANGED: {} -> {}",
        SeverityLevel::name_or_normal(previous),
        SeverityLevel::name_or_normal(current)
    )];
    if let Some(reason) = &state.primary_reason {
        lines.push(format!("Reason: {reason}"));
    }
    if let Some(entity_id) = &state.primary_entity {
        lines.push(format!("Entity: {entity_id}"));
    }
    if let Some(value) = &state.primary_value {
        lines.push(format!("Value: {value}"));
    }
    lines.join("\n")
}

/// Normalise a notify target to `notify.<service>`
///
/// A bare service name belongs to the `notify` domain. Targets in any other
/// domain are logged and skipped.
pub fn notify_service(target: &str) -> Option<String> {
    let target = target.trim();
    let (domain, service) = target.split_once('.').unwrap_or(("notify", target));
    if domain != "notify" || service.is_empty() {
        warn!("Invalid notify target: {}", target);
        return None;
    }
    Some(format!("notify.{service}"))
}

fn mobile_messages<'a>(
    targets: &'a [String],
    title: &str,
    message: &str,
    urgent: bool,
) -> impl Iterator<Item = MobileMessage> + 'a {
    let title = title.to_string();
    let message = message.to_string();
    targets
        .iter()
        .filter_map(|target| notify_service(target))
        .map(move |target| MobileMessage {
            target,
            title: title.clone(),
            message: message.clone(),
            urgent,
        })
}

/// Mobile messages for a level change of the mobile view
///
/// Returning to normal goes to the notify targets. Otherwise the new level's
/// targets are used and, on a downgrade, the previous level's targets too.
pub fn plan_level_change(
    previous: Option<SeverityLevel>,
    current: Option<SeverityLevel>,
    state: &GlobalSeverityState,
    settings: &MobileSettings,
) -> Vec<MobileMessage> {
    if !settings.enabled || previous == current {
        return Vec::new();
    }

    let message = format_level_change_message(previous, current, state);
    let title = mobile_title(current);
    let mut messages: Vec<MobileMessage> = mobile_messages(
        settings.targets_for(current),
        &title,
        &message,
        settings.urgent_for(current),
    )
    .collect();

    let downgrade = matches!((previous, current), (Some(from), Some(to)) if to < from);
    if downgrade {
        messages.extend(mobile_messages(
            settings.targets_for(previous),
            &title,
            &message,
            settings.urgent_for(previous),
        ));
    }
    messages
}

/// Activation email when the email view goes from inactive to active
///
/// `report` is only built when an email will actually be sent.
pub fn plan_activation_email(
    previously_active: bool,
    state: &GlobalSeverityState,
    settings: &EmailSettings,
    report: impl FnOnce() -> serde_json::Value,
) -> Option<EmailMessage> {
    if previously_active || !state.active {
        return None;
    }
    if !settings.should_send(state.level) {
        debug!(
            level = state.level_name(),
            "Email disabled or missing recipient for level"
        );
        return None;
    }
    report_email(state.level, settings, &report())
}

/// Report email for `level`, if email is enabled for it
pub fn report_email(
    level: Option<SeverityLevel>,
    settings: &EmailSettings,
    report: &serde_json::Value,
) -> Option<EmailMessage> {
    if !settings.should_send(level) {
        return None;
    }
    let recipient = settings.recipient_for(level)?.to_string();
    let level_name = SeverityLevel::name_or_normal(level);
    let report_json = serde_json::to_string_pretty(report).unwrap_or_default();
    let body = [
        format!("Current level: {level_name}"),
        String::new(),
        "Emergency Stop report (JSON):".to_string(),
        report_json,
    ]
    .join("\n");

    Some(EmailMessage {
        recipient,
        level,
        subject: format!("Emergency Stop [{level_name}]"),
        body,
    })
}

/// Outcome counts of one dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub timed_out: bool,
}

/// Send all notifications concurrently under one aggregate timeout
pub async fn dispatch(
    notifier: &dyn Notifier,
    notifications: &[Notification],
    timeout: Duration,
) -> DispatchSummary {
    if notifications.is_empty() {
        return DispatchSummary::default();
    }

    let sends = notifications.iter().map(|notification| async move {
        match notification {
            Notification::Email(message) => notifier.send_email(message).await,
            Notification::Mobile(message) => notifier.send_mobile(message).await,
        }
    });

    match tokio::time::timeout(timeout, join_all(sends)).await {
        Ok(results) => {
            let mut summary = DispatchSummary::default();
            for result in results {
                match result {
                    Ok(()) => summary.sent += 1,
                    Err(e) => {
                        warn!("Notification failed: {:#}", e);
                        summary.failed += 1;
                    }
                }
            }
            summary
        }
        Err(_) => {
            warn!(
                "Notifications timed out after {}s",
                timeout.as_secs_f64()
            );
            DispatchSummary {
                timed_out: true,
                ..Default::default()
            }
        }
    }
}
