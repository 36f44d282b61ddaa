use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_AGE_RISING_DAYS: i64 = 90;
pub const DEFAULT_MIN_STARS_RISING: i64 = 10;
pub const DEFAULT_MIN_STARS_PER_DAY_RISING: f64 = 0.5;
pub const DEFAULT_MIN_STARS_ESTABLISHED: i64 = 100;

pub const DEFAULT_SIGNIFICANT_GROWTH_MARGIN: f64 = 0.10;
pub const DEFAULT_HIGH_GROWTH_PER_DAY: f64 = 30.0;
pub const DEFAULT_MIN_RELEVANCE: f64 = 30.0;
pub const DEFAULT_MAX_ALERTS_PER_RUN: usize = 10;
pub const DEFAULT_PRIORITY_KEYWORDS: &[&str] =
    &["mcp", "protocol", "agent", "claude", "api", "sdk", "ucp"];

/// Classification thresholds for the growth classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_age_rising_days: i64,
    pub min_stars_rising: i64,
    pub min_stars_per_day_rising: f64,
    pub min_stars_established: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_age_rising_days: DEFAULT_MAX_AGE_RISING_DAYS,
            min_stars_rising: DEFAULT_MIN_STARS_RISING,
            min_stars_per_day_rising: DEFAULT_MIN_STARS_PER_DAY_RISING,
            min_stars_established: DEFAULT_MIN_STARS_ESTABLISHED,
        }
    }
}

/// Knobs for change detection and alert selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPolicyConfig {
    /// Relative popularity growth since the last observation that counts as
    /// significant on its own (0.10 = 10%).
    pub significant_growth_margin: f64,
    /// Growth rate (per day) strictly above which an alert is `high`.
    pub high_growth_per_day: f64,
    /// Minimum precomputed relevance score for an informational alert.
    pub min_relevance: f64,
    pub max_alerts_per_run: usize,
    pub priority_keywords: Vec<String>,
}

impl Default for AlertPolicyConfig {
    fn default() -> Self {
        Self {
            significant_growth_margin: DEFAULT_SIGNIFICANT_GROWTH_MARGIN,
            high_growth_per_day: DEFAULT_HIGH_GROWTH_PER_DAY,
            min_relevance: DEFAULT_MIN_RELEVANCE,
            max_alerts_per_run: DEFAULT_MAX_ALERTS_PER_RUN,
            priority_keywords: DEFAULT_PRIORITY_KEYWORDS
                .iter()
                .map(|k| (*k).to_string())
                .collect(),
        }
    }
}
