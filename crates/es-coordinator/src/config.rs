//! Integration configuration
//!
//! One YAML document holds the rule list and the notification settings:
//!
//! ```yaml
//! notification_timeout_seconds: 3
//! email:
//!   levels: [limit, shutdown]
//!   recipient: ops@example.com
//! mobile:
//!   enabled: true
//!   targets_shutdown: [notify.mobile_app_phone]
//! rules:
//!   - rule_id: pack_max
//!     ...
//! ```

use es_core::SeverityLevel;
use es_rules::RuleSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_NOTIFICATION_TIMEOUT_SECONDS: u64 = 3;

/// Activation email settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// Levels that trigger an activation email
    pub levels: Vec<SeverityLevel>,
    /// Fallback recipient for levels without their own
    pub recipient: Option<String>,
    pub recipient_notify: Option<String>,
    pub recipient_limit: Option<String>,
    pub recipient_shutdown: Option<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            levels: vec![SeverityLevel::Limit, SeverityLevel::Shutdown],
            recipient: None,
            recipient_notify: None,
            recipient_limit: None,
            recipient_shutdown: None,
        }
    }
}

impl EmailSettings {
    /// Level used for email routing; inactive maps to `notify`
    pub fn effective_level(level: Option<SeverityLevel>) -> SeverityLevel {
        level.unwrap_or(SeverityLevel::Notify)
    }

    /// Per-level recipient, else the default one; blank entries are ignored
    pub fn recipient_for(&self, level: Option<SeverityLevel>) -> Option<&str> {
        let specific = match Self::effective_level(level) {
            SeverityLevel::Notify => &self.recipient_notify,
            SeverityLevel::Limit => &self.recipient_limit,
            SeverityLevel::Shutdown => &self.recipient_shutdown,
        };
        non_blank(specific).or_else(|| non_blank(&self.recipient))
    }

    /// Whether an email for `level` is enabled and has somewhere to go
    pub fn should_send(&self, level: Option<SeverityLevel>) -> bool {
        self.levels.contains(&Self::effective_level(level)) && self.recipient_for(level).is_some()
    }

    pub fn has_recipient(&self) -> bool {
        SeverityLevel::ALL
            .iter()
            .any(|level| self.recipient_for(Some(*level)).is_some())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Mobile push settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MobileSettings {
    pub enabled: bool,
    pub targets_notify: Vec<String>,
    pub targets_limit: Vec<String>,
    pub targets_shutdown: Vec<String>,
    pub urgent_notify: bool,
    pub urgent_limit: bool,
    pub urgent_shutdown: bool,
}

impl Default for MobileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            targets_notify: Vec::new(),
            targets_limit: Vec::new(),
            targets_shutdown: Vec::new(),
            urgent_notify: false,
            urgent_limit: false,
            urgent_shutdown: true,
        }
    }
}

impl MobileSettings {
    /// Targets for a level; normal uses the notify targets
    pub fn targets_for(&self, level: Option<SeverityLevel>) -> &[String] {
        match level.unwrap_or(SeverityLevel::Notify) {
            SeverityLevel::Notify => &self.targets_notify,
            SeverityLevel::Limit => &self.targets_limit,
            SeverityLevel::Shutdown => &self.targets_shutdown,
        }
    }

    pub fn urgent_for(&self, level: Option<SeverityLevel>) -> bool {
        match level.unwrap_or(SeverityLevel::Notify) {
            SeverityLevel::Notify => self.urgent_notify,
            SeverityLevel::Limit => self.urgent_limit,
            SeverityLevel::Shutdown => self.urgent_shutdown,
        }
    }

    /// Every configured target once, sorted
    pub fn all_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = SeverityLevel::ALL
            .iter()
            .flat_map(|level| self.targets_for(Some(*level)).iter().cloned())
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }
}

/// Notification settings shared by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email: EmailSettings,
    pub mobile: MobileSettings,
    /// Aggregate timeout for all sends of one tick
    pub notification_timeout_seconds: u64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email: EmailSettings::default(),
            mobile: MobileSettings::default(),
            notification_timeout_seconds: DEFAULT_NOTIFICATION_TIMEOUT_SECONDS,
        }
    }
}

/// Full integration configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Raw rule entries, validated one by one when loaded
    #[serde(default)]
    pub rules: Vec<serde_json::Value>,

    #[serde(flatten)]
    pub notifications: NotificationSettings,
}

impl IntegrationConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("Loading integration config: {:?}", path);
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml_str(&content, path)
    }

    /// Parse configuration from YAML text; `source_path` is used in errors
    pub fn from_yaml_str(content: &str, source_path: &Path) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.notifications.notification_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "notification_timeout_seconds".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Validate the rule entries, skipping invalid ones
    pub fn rule_set(&self) -> RuleSet {
        RuleSet::from_values(self.rules.clone())
    }
}
