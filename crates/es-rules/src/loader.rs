//! Loading rule sets from stored configuration
//!
//! A rule set is loaded entry by entry: an invalid rule is logged and skipped
//! so that one bad entry never disables the rest of the monitoring.

use crate::config::RuleConfig;
use crate::error::{RuleError, RuleResult};
use crate::rule::RuleDefinition;
use es_core::RuleId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Current version of the rules export format
pub const RULES_EXPORT_VERSION: u32 = 1;

/// A rule entry that failed validation
#[derive(Debug)]
pub struct RejectedRule {
    /// Position of the entry in the source list
    pub index: usize,
    /// Raw `rule_id`, when the entry had one
    pub rule_id: Option<String>,
    pub error: RuleError,
}

/// Serialized rules document: `{"version": 1, "rules": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesExport {
    pub version: u32,
    pub rules: Vec<RuleConfig>,
}

impl RulesExport {
    pub fn from_rules(rules: &[RuleDefinition]) -> Self {
        Self {
            version: RULES_EXPORT_VERSION,
            rules: rules.iter().map(RuleDefinition::to_config).collect(),
        }
    }
}

/// Validated rules in configuration order
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<RuleDefinition>,
    rejected: Vec<RejectedRule>,
}

impl RuleSet {
    /// Validate already-typed rule definitions, failing on the first error
    pub fn new(rules: Vec<RuleDefinition>) -> RuleResult<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.clone()) {
                return Err(RuleError::DuplicateId(rule.id.to_string()));
            }
        }
        Ok(Self {
            rules,
            rejected: Vec::new(),
        })
    }

    /// Load rules from loosely-typed entries, skipping invalid ones
    pub fn from_values(entries: Vec<serde_json::Value>) -> Self {
        let mut set = Self::default();
        let mut seen: HashSet<RuleId> = HashSet::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let rule_id = entry
                .get("rule_id")
                .and_then(|v| v.as_str())
                .map(str::to_string);

            let result = serde_json::from_value::<RuleConfig>(entry)
                .map_err(RuleError::from)
                .and_then(RuleDefinition::try_from)
                .and_then(|rule| {
                    if seen.insert(rule.id.clone()) {
                        Ok(rule)
                    } else {
                        Err(RuleError::DuplicateId(rule.id.to_string()))
                    }
                });

            match result {
                Ok(rule) => {
                    debug!(rule_id = %rule.id, "Loaded rule '{}'", rule.name);
                    set.rules.push(rule);
                }
                Err(err) => {
                    error!(
                        index,
                        rule_id = rule_id.as_deref().unwrap_or("-"),
                        "Skipping invalid rule: {}",
                        err
                    );
                    set.rejected.push(RejectedRule {
                        index,
                        rule_id,
                        error: err,
                    });
                }
            }
        }

        info!(
            "Loaded {} rule(s), rejected {}",
            set.rules.len(),
            set.rejected.len()
        );
        set
    }

    /// Load from JSON: either a bare list or an export document
    pub fn from_json_str(content: &str) -> RuleResult<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        Ok(Self::from_values(rule_entries(value)))
    }

    /// Load from YAML: either a bare list or a mapping with a `rules` key
    pub fn from_yaml_str(content: &str) -> RuleResult<Self> {
        let value: serde_json::Value = serde_yaml::from_str(content)?;
        Ok(Self::from_values(rule_entries(value)))
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<RuleDefinition> {
        self.rules
    }

    pub fn rejected(&self) -> &[RejectedRule] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &RuleId) -> Option<&RuleDefinition> {
        self.rules.iter().find(|rule| &rule.id == id)
    }

    /// Export the loaded rules in the versioned document format
    pub fn export(&self) -> RulesExport {
        RulesExport::from_rules(&self.rules)
    }
}

fn rule_entries(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Object(mut map) => match map.remove("rules") {
            Some(serde_json::Value::Array(entries)) => entries,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
