//! Severity levels and the enum-indexed per-level map

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

/// Level name reported when nothing is active
pub const LEVEL_NORMAL: &str = "normal";

/// Ordered severity of an active condition: `notify < limit < shutdown`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Notify,
    Limit,
    Shutdown,
}

impl SeverityLevel {
    /// All levels in ascending severity order
    pub const ALL: [SeverityLevel; 3] = [
        SeverityLevel::Notify,
        SeverityLevel::Limit,
        SeverityLevel::Shutdown,
    ];

    /// Numeric rank, 1 for notify up to 3 for shutdown
    pub fn rank(self) -> u8 {
        match self {
            SeverityLevel::Notify => 1,
            SeverityLevel::Limit => 2,
            SeverityLevel::Shutdown => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeverityLevel::Notify => "notify",
            SeverityLevel::Limit => "limit",
            SeverityLevel::Shutdown => "shutdown",
        }
    }

    /// Name of an optional level, `normal` when absent
    pub fn name_or_normal(level: Option<SeverityLevel>) -> &'static str {
        level.map(SeverityLevel::as_str).unwrap_or(LEVEL_NORMAL)
    }

    fn slot(self) -> usize {
        self.rank() as usize - 1
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeverityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notify" => Ok(SeverityLevel::Notify),
            "limit" => Ok(SeverityLevel::Limit),
            "shutdown" => Ok(SeverityLevel::Shutdown),
            other => Err(format!("unknown severity level: {other}")),
        }
    }
}

/// Fixed-size map with one slot per [`SeverityLevel`]
///
/// Lookups are exhaustive: every level always has a slot, so there is no
/// "missing key" case to handle at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LevelMap<T> {
    slots: [T; 3],
}

impl<T> LevelMap<T> {
    pub fn from_fn(mut f: impl FnMut(SeverityLevel) -> T) -> Self {
        Self {
            slots: SeverityLevel::ALL.map(&mut f),
        }
    }

    /// Iterate `(level, value)` pairs in ascending severity order
    pub fn iter(&self) -> impl Iterator<Item = (SeverityLevel, &T)> {
        SeverityLevel::ALL.into_iter().zip(self.slots.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SeverityLevel, &mut T)> {
        SeverityLevel::ALL.into_iter().zip(self.slots.iter_mut())
    }
}

impl<T> LevelMap<Option<T>> {
    /// Iterate only the populated slots
    pub fn configured(&self) -> impl Iterator<Item = (SeverityLevel, &T)> {
        self.iter().filter_map(|(level, v)| v.as_ref().map(|v| (level, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl<T> Index<SeverityLevel> for LevelMap<T> {
    type Output = T;

    fn index(&self, level: SeverityLevel) -> &T {
        &self.slots[level.slot()]
    }
}

impl<T> IndexMut<SeverityLevel> for LevelMap<T> {
    fn index_mut(&mut self, level: SeverityLevel) -> &mut T {
        &mut self.slots[level.slot()]
    }
}

impl<T: Serialize> Serialize for LevelMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        for (level, value) in self.iter() {
            map.serialize_entry(level.as_str(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order() {
        assert!(SeverityLevel::Notify < SeverityLevel::Limit);
        assert!(SeverityLevel::Limit < SeverityLevel::Shutdown);
        assert_eq!(
            SeverityLevel::ALL.iter().max(),
            Some(&SeverityLevel::Shutdown)
        );
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("limit".parse::<SeverityLevel>(), Ok(SeverityLevel::Limit));
        assert!("critical".parse::<SeverityLevel>().is_err());
        assert_eq!(SeverityLevel::Shutdown.to_string(), "shutdown");
        assert_eq!(SeverityLevel::name_or_normal(None), "normal");
    }

    #[test]
    fn test_level_map_indexing() {
        let mut map: LevelMap<Option<f64>> = LevelMap::default();
        assert!(map.is_empty());

        map[SeverityLevel::Limit] = Some(3.6);
        assert_eq!(map[SeverityLevel::Limit], Some(3.6));
        assert_eq!(map[SeverityLevel::Notify], None);

        let configured: Vec<_> = map.configured().map(|(l, _)| l).collect();
        assert_eq!(configured, vec![SeverityLevel::Limit]);
    }

    #[test]
    fn test_level_map_serializes_as_object() {
        let map = LevelMap::from_fn(|level| level.rank());
        let json = serde_json::to_value(map).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"notify": 1, "limit": 2, "shutdown": 3})
        );
    }
}
