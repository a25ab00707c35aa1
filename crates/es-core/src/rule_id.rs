//! Stable rule identifier

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for invalid rule IDs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleIdError {
    #[error("rule_id cannot be empty")]
    Empty,

    #[error("rule_id cannot start or end with whitespace")]
    SurroundingWhitespace,
}

/// Identifier of a rule, stable across edits of the rule's configuration
///
/// Rule IDs order lexicographically; that order is the final tie-break when
/// choosing the primary active event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleId(String);

impl RuleId {
    pub fn new(id: impl Into<String>) -> Result<Self, RuleIdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(RuleIdError::Empty);
        }
        if id.trim() != id {
            return Err(RuleIdError::SurroundingWhitespace);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RuleId {
    type Err = RuleIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RuleId {
    type Error = RuleIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RuleId> for String {
    fn from(id: RuleId) -> String {
        id.0
    }
}

impl AsRef<str> for RuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
