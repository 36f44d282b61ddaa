use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Growth classification assigned to a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Rising,
    Established,
    Watching,
}

impl Category {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Rising => "rising",
            Category::Established => "established",
            Category::Watching => "watching",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rising" => Ok(Category::Rising),
            "established" => Ok(Category::Established),
            "watching" => Ok(Category::Watching),
            other => Err(CoreError::InvalidCategory(other.to_string())),
        }
    }
}

/// Why an alert was raised.
///
/// Declaration order is the tie-break rank when several reasons fire for the
/// same entity: earlier variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertCategory {
    Rising,
    HighValue,
    Informational,
}

impl AlertCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AlertCategory::Rising => "rising",
            AlertCategory::HighValue => "high-value",
            AlertCategory::Informational => "informational",
        }
    }

    /// Lower is stronger.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            AlertCategory::Rising => 0,
            AlertCategory::HighValue => 1,
            AlertCategory::Informational => 2,
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AlertCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rising" => Ok(AlertCategory::Rising),
            "high-value" => Ok(AlertCategory::HighValue),
            "informational" => Ok(AlertCategory::Informational),
            other => Err(CoreError::InvalidAlertCategory(other.to_string())),
        }
    }
}

/// Alert priority. `High` sorts above `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    High,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(CoreError::InvalidPriority(other.to_string())),
        }
    }
}

/// An observation exactly as a source produced it, before validation.
///
/// Counts are signed so that bad upstream data can be represented and
/// rejected rather than silently wrapped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawObservation {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub popularity: i64,
    #[serde(default)]
    pub secondary_count: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Free-form label from the source (e.g. the search topic that found it).
    #[serde(default)]
    pub source_label: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Precomputed relevance score from the content-scoring side, if any.
    #[serde(default)]
    pub relevance: Option<f64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A validated, canonical observation ready for the entity store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub identity: String,
    pub popularity: i64,
    pub secondary_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub source_label: Option<String>,
    pub topics: Vec<String>,
    pub relevance: Option<f64>,
    pub metadata: BTreeMap<String, String>,
}

/// Current state of one watched entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedEntity {
    pub identity: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub source_label: Option<String>,
    pub topics: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub popularity: i64,
    pub secondary_count: i64,
    pub created_at: DateTime<Utc>,
    pub growth_rate: f64,
    /// `None` until the first classification has been persisted.
    pub category: Option<Category>,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// One historical measurement. Holds the counts an entity had before the
/// update that produced this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObservationRecord {
    pub identity: String,
    pub popularity: i64,
    pub secondary_count: i64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub entity_identity: String,
    pub category: AlertCategory,
    pub priority: Priority,
    pub summary: String,
    pub url: Option<String>,
    pub popularity: i64,
    pub growth_rate: f64,
    pub generated_at: DateTime<Utc>,
}

/// Aggregate row for the "counts grouped by category" display query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    /// `None` groups entities that have never been classified.
    pub category: Option<Category>,
    pub count: i64,
    pub avg_popularity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for category in [Category::Rising, Category::Established, Category::Watching] {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert_eq!(
            "hot".parse::<Category>(),
            Err(CoreError::InvalidCategory("hot".to_string()))
        );
    }

    #[test]
    fn alert_category_serializes_kebab_case() {
        let json = serde_json::to_string(&AlertCategory::HighValue).unwrap();
        assert_eq!(json, "\"high-value\"");
        assert_eq!(
            "high-value".parse::<AlertCategory>().unwrap(),
            AlertCategory::HighValue
        );
    }

    #[test]
    fn high_priority_sorts_above_normal() {
        assert!(Priority::High > Priority::Normal);
    }

    #[test]
    fn raw_observation_tolerates_missing_fields() {
        let raw: RawObservation = serde_json::from_str(r#"{"popularity": 10}"#).unwrap();
        assert!(raw.identity.is_none());
        assert_eq!(raw.popularity, 10);
        assert!(raw.topics.is_empty());
    }
}
