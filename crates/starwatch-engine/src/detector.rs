//! Change detector: decides whether a fresh classification is a new event.
//!
//! Works only from the persisted category and the pre-update popularity the
//! store hands back from `upsert`; it never scans history.

use serde::Serialize;
use starwatch_core::Category;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    FirstClassification,
    CategoryChanged,
    PopularityGrowth,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectorInput {
    pub previous_category: Option<Category>,
    /// Popularity before this cycle's upsert. `None` for a newly created entity.
    pub previous_popularity: Option<i64>,
    pub current_popularity: i64,
    pub new_category: Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeDelta {
    pub is_significant: bool,
    pub old_category: Option<Category>,
    pub new_category: Category,
    pub popularity_delta: i64,
    pub reason: Option<ChangeReason>,
}

/// Compare a new classification with the last persisted state.
///
/// `growth_margin` is relative: `0.10` flags growth of 10% or more over the
/// previous popularity. Zero growth is never significant on its own.
#[must_use]
pub fn detect(input: &DetectorInput, growth_margin: f64) -> ChangeDelta {
    let popularity_delta = input
        .previous_popularity
        .map_or(0, |prev| input.current_popularity - prev);

    let grew_enough = input
        .previous_popularity
        .is_some_and(|prev| grew_by_margin(prev, popularity_delta, growth_margin));

    let reason = match input.previous_category {
        None => Some(ChangeReason::FirstClassification),
        Some(old) if old != input.new_category => Some(ChangeReason::CategoryChanged),
        Some(_) if grew_enough => Some(ChangeReason::PopularityGrowth),
        Some(_) => None,
    };

    ChangeDelta {
        is_significant: reason.is_some(),
        old_category: input.previous_category,
        new_category: input.new_category,
        popularity_delta,
        reason,
    }
}

#[allow(clippy::cast_precision_loss)]
fn grew_by_margin(previous: i64, delta: i64, margin: f64) -> bool {
    delta > 0 && delta as f64 >= previous as f64 * margin
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARGIN: f64 = 0.10;

    fn input(
        previous_category: Option<Category>,
        previous_popularity: Option<i64>,
        current_popularity: i64,
        new_category: Category,
    ) -> DetectorInput {
        DetectorInput {
            previous_category,
            previous_popularity,
            current_popularity,
            new_category,
        }
    }

    #[test]
    fn first_classification_is_significant() {
        let delta = detect(&input(None, None, 50, Category::Rising), MARGIN);
        assert!(delta.is_significant);
        assert_eq!(delta.reason, Some(ChangeReason::FirstClassification));
        assert_eq!(delta.popularity_delta, 0);
    }

    #[test]
    fn category_change_is_significant() {
        let delta = detect(
            &input(Some(Category::Watching), Some(99), 100, Category::Established),
            MARGIN,
        );
        assert!(delta.is_significant);
        assert_eq!(delta.reason, Some(ChangeReason::CategoryChanged));
        assert_eq!(delta.old_category, Some(Category::Watching));
        assert_eq!(delta.new_category, Category::Established);
    }

    #[test]
    fn growth_at_margin_is_significant() {
        let delta = detect(
            &input(Some(Category::Rising), Some(100), 110, Category::Rising),
            MARGIN,
        );
        assert!(delta.is_significant);
        assert_eq!(delta.reason, Some(ChangeReason::PopularityGrowth));
        assert_eq!(delta.popularity_delta, 10);
    }

    #[test]
    fn growth_below_margin_is_not_significant() {
        let delta = detect(
            &input(Some(Category::Rising), Some(100), 109, Category::Rising),
            MARGIN,
        );
        assert!(!delta.is_significant);
        assert!(delta.reason.is_none());
    }

    #[test]
    fn unchanged_entity_is_not_flagged() {
        let delta = detect(
            &input(Some(Category::Rising), Some(50), 50, Category::Rising),
            MARGIN,
        );
        assert!(!delta.is_significant);
    }

    #[test]
    fn zero_margin_still_ignores_zero_growth() {
        let delta = detect(
            &input(Some(Category::Watching), Some(0), 0, Category::Watching),
            0.0,
        );
        assert!(!delta.is_significant);
    }

    #[test]
    fn growth_from_zero_is_significant() {
        let delta = detect(
            &input(Some(Category::Watching), Some(0), 3, Category::Watching),
            MARGIN,
        );
        assert!(delta.is_significant);
    }

    #[test]
    fn never_flags_twice_in_a_row_without_change() {
        let first = detect(&input(None, None, 50, Category::Rising), MARGIN);
        assert!(first.is_significant);
        let second = detect(
            &input(Some(first.new_category), Some(50), 50, Category::Rising),
            MARGIN,
        );
        assert!(!second.is_significant);
    }
}
