//! Growth classifier.
//!
//! Pure over an explicit input: the same entity, thresholds and `now` always
//! produce the same classification.

use chrono::{DateTime, Utc};
use serde::Serialize;
use starwatch_core::{Category, Thresholds, TrackedEntity};

use crate::error::ClassificationError;

#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub identity: &'a str,
    pub popularity: i64,
    pub created_at: DateTime<Utc>,
}

impl<'a> From<&'a TrackedEntity> for ClassifierInput<'a> {
    fn from(entity: &'a TrackedEntity) -> Self {
        Self {
            identity: &entity.identity,
            popularity: entity.popularity,
            created_at: entity.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    /// Whole days since creation, never less than 1.
    pub age_days: i64,
    /// Popularity per day of age, full precision.
    pub growth_rate: f64,
    pub category: Category,
}

/// Classify one entity. First matching rule wins:
/// rising, then established, then watching.
///
/// # Errors
///
/// Returns [`ClassificationError::CreatedInFuture`] when `created_at` is later
/// than `now`.
pub fn classify(
    input: ClassifierInput<'_>,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Result<Classification, ClassificationError> {
    if input.created_at > now {
        return Err(ClassificationError::CreatedInFuture {
            identity: input.identity.to_string(),
            created_at: input.created_at,
            now,
        });
    }

    let age_days = (now - input.created_at).num_days().max(1);
    #[allow(clippy::cast_precision_loss)]
    let growth_rate = input.popularity as f64 / age_days as f64;

    let category = if age_days <= thresholds.max_age_rising_days
        && input.popularity >= thresholds.min_stars_rising
        && growth_rate >= thresholds.min_stars_per_day_rising
    {
        Category::Rising
    } else if input.popularity >= thresholds.min_stars_established {
        Category::Established
    } else {
        Category::Watching
    };

    Ok(Classification {
        age_days,
        growth_rate,
        category,
    })
}

/// Round to two decimals for display.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn input(popularity: i64, age_days: i64) -> ClassifierInput<'static> {
        ClassifierInput {
            identity: "acme/widget",
            popularity,
            created_at: now() - Duration::days(age_days),
        }
    }

    #[test]
    fn young_fast_repo_is_rising() {
        let c = classify(input(50, 5), &Thresholds::default(), now()).unwrap();
        assert_eq!(c.age_days, 5);
        assert!((c.growth_rate - 10.0).abs() < f64::EPSILON);
        assert_eq!(c.category, Category::Rising);
    }

    #[test]
    fn old_popular_repo_is_established() {
        let c = classify(input(500, 400), &Thresholds::default(), now()).unwrap();
        assert!((c.growth_rate - 1.25).abs() < f64::EPSILON);
        assert_eq!(c.category, Category::Established);
    }

    #[test]
    fn rising_takes_precedence_over_established() {
        let c = classify(input(5_000, 10), &Thresholds::default(), now()).unwrap();
        assert_eq!(c.category, Category::Rising);
    }

    #[test]
    fn old_small_repo_is_watching() {
        let c = classify(input(50, 100), &Thresholds::default(), now()).unwrap();
        assert_eq!(c.category, Category::Watching);
    }

    #[test]
    fn rising_requires_minimum_stars() {
        let c = classify(input(9, 1), &Thresholds::default(), now()).unwrap();
        assert_eq!(c.category, Category::Watching);
    }

    #[test]
    fn rising_requires_minimum_rate() {
        // 40 stars over 90 days is 0.44/day, below the 0.5 floor.
        let c = classify(input(40, 90), &Thresholds::default(), now()).unwrap();
        assert_eq!(c.category, Category::Watching);
    }

    #[test]
    fn age_boundary_is_inclusive() {
        let c = classify(input(90, 90), &Thresholds::default(), now()).unwrap();
        assert_eq!(c.category, Category::Rising);
        let c = classify(input(91, 91), &Thresholds::default(), now()).unwrap();
        assert_eq!(c.category, Category::Watching);
    }

    #[test]
    fn brand_new_repo_counts_as_one_day_old() {
        let entity = ClassifierInput {
            identity: "acme/fresh",
            popularity: 12,
            created_at: now() - Duration::hours(3),
        };
        let c = classify(entity, &Thresholds::default(), now()).unwrap();
        assert_eq!(c.age_days, 1);
        assert!((c.growth_rate - 12.0).abs() < f64::EPSILON);
    }

    #[test]
    fn future_created_at_is_a_classification_error() {
        let entity = ClassifierInput {
            identity: "acme/clock-skew",
            popularity: 12,
            created_at: now() + Duration::days(2),
        };
        let err = classify(entity, &Thresholds::default(), now()).unwrap_err();
        assert!(matches!(err, ClassificationError::CreatedInFuture { .. }));
    }

    #[test]
    fn growth_rate_never_decreases_as_popularity_grows() {
        let mut last = 0.0;
        for popularity in [0, 1, 10, 11, 250, 251, 10_000] {
            let c = classify(input(popularity, 37), &Thresholds::default(), now()).unwrap();
            assert!(c.growth_rate >= last);
            last = c.growth_rate;
        }
    }

    #[test]
    fn classification_is_deterministic() {
        let thresholds = Thresholds::default();
        let a = classify(input(321, 45), &thresholds, now()).unwrap();
        let b = classify(input(321, 45), &thresholds, now()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn custom_thresholds_are_honoured() {
        let thresholds = Thresholds {
            max_age_rising_days: 30,
            min_stars_rising: 100,
            min_stars_per_day_rising: 5.0,
            min_stars_established: 1_000,
        };
        let c = classify(input(50, 5), &thresholds, now()).unwrap();
        assert_eq!(c.category, Category::Watching);
        let c = classify(input(500, 400), &thresholds, now()).unwrap();
        assert_eq!(c.category, Category::Watching);
    }

    #[test]
    fn round2_rounds_for_display() {
        assert!((round2(1.234_56) - 1.23).abs() < f64::EPSILON);
        assert!((round2(10.0 / 3.0) - 3.33).abs() < f64::EPSILON);
    }
}
