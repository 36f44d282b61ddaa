//! Alert policy: collect, filter, prioritize, deduplicate, emit.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::Regex;
use starwatch_core::{Alert, AlertCategory, AlertPolicyConfig, Category, Priority, TrackedEntity};

use crate::classifier::Classification;
use crate::detector::ChangeDelta;
use crate::error::PolicyError;

/// Everything the policy needs to know about one entity touched this cycle.
#[derive(Debug, Clone)]
pub struct AlertCandidate {
    pub entity: TrackedEntity,
    pub classification: Classification,
    pub change: ChangeDelta,
    /// Precomputed relevance score carried on the observation, if any.
    pub relevance: Option<f64>,
}

#[derive(Debug, Default)]
pub struct PolicyOutcome {
    /// Alerts to deliver, in emission order.
    pub emitted: Vec<Alert>,
    /// Qualifying alerts cut by the per-run cap, in the order they ranked.
    pub not_emitted: Vec<Alert>,
}

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    config: AlertPolicyConfig,
    keywords: Option<Regex>,
}

impl AlertPolicy {
    /// Compile the priority keyword matcher.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::KeywordPattern`] if the keyword alternation
    /// cannot be compiled.
    pub fn new(config: AlertPolicyConfig) -> Result<Self, PolicyError> {
        let escaped: Vec<String> = config
            .priority_keywords
            .iter()
            .map(String::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();

        let keywords = if escaped.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)\b(?:{})\b", escaped.join("|")))?)
        };

        Ok(Self { config, keywords })
    }

    #[must_use]
    pub fn config(&self) -> &AlertPolicyConfig {
        &self.config
    }

    /// Whether any descriptive field of the entity mentions a priority keyword
    /// as a whole word.
    #[must_use]
    pub fn matches_keyword(&self, entity: &TrackedEntity) -> bool {
        let Some(re) = &self.keywords else {
            return false;
        };
        std::iter::once(entity.identity.as_str())
            .chain(entity.description.as_deref())
            .chain(entity.language.as_deref())
            .chain(entity.topics.iter().map(String::as_str))
            .chain(entity.metadata.values().map(String::as_str))
            .any(|field| re.is_match(field))
    }

    fn priority_for(&self, candidate: &AlertCandidate) -> Priority {
        if candidate.classification.growth_rate > self.config.high_growth_per_day
            || self.matches_keyword(&candidate.entity)
        {
            Priority::High
        } else {
            Priority::Normal
        }
    }

    /// The strongest reason this candidate qualifies, if any.
    fn reason_for(&self, candidate: &AlertCandidate) -> Option<AlertCategory> {
        if candidate.change.is_significant {
            match candidate.classification.category {
                Category::Rising => return Some(AlertCategory::Rising),
                Category::Established => return Some(AlertCategory::HighValue),
                Category::Watching => {}
            }
        }
        candidate
            .relevance
            .filter(|score| *score >= self.config.min_relevance)
            .map(|_| AlertCategory::Informational)
    }

    /// Run the policy over every candidate touched this cycle.
    #[must_use]
    pub fn evaluate(&self, candidates: &[AlertCandidate], now: DateTime<Utc>) -> PolicyOutcome {
        let mut best: HashMap<&str, Alert> = HashMap::new();

        for candidate in candidates {
            let Some(reason) = self.reason_for(candidate) else {
                continue;
            };
            let alert = build_alert(candidate, reason, self.priority_for(candidate), now);

            let replace = best
                .get(candidate.entity.identity.as_str())
                .is_none_or(|existing| dedupe_order(existing, &alert) == Ordering::Greater);
            if replace {
                best.insert(candidate.entity.identity.as_str(), alert);
            }
        }

        let mut ranked: Vec<Alert> = best.into_values().collect();
        ranked.sort_by(emission_order);

        let cap = self.config.max_alerts_per_run;
        let not_emitted = if ranked.len() > cap {
            ranked.split_off(cap)
        } else {
            Vec::new()
        };

        for dropped in &not_emitted {
            tracing::info!(
                identity = %dropped.entity_identity,
                category = %dropped.category,
                priority = %dropped.priority,
                "alert candidate over per-run cap, not emitted"
            );
        }

        PolicyOutcome {
            emitted: ranked,
            not_emitted,
        }
    }
}

/// `Greater` when `candidate` should replace `existing` for the same identity.
fn dedupe_order(existing: &Alert, candidate: &Alert) -> Ordering {
    candidate
        .priority
        .cmp(&existing.priority)
        .then_with(|| existing.category.rank().cmp(&candidate.category.rank()))
}

fn emission_order(a: &Alert, b: &Alert) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.growth_rate.total_cmp(&a.growth_rate))
        .then_with(|| a.entity_identity.cmp(&b.entity_identity))
}

fn build_alert(
    candidate: &AlertCandidate,
    category: AlertCategory,
    priority: Priority,
    now: DateTime<Utc>,
) -> Alert {
    let entity = &candidate.entity;
    let c = &candidate.classification;
    let summary = match category {
        AlertCategory::Rising => format!(
            "{} is rising: {} stars in {} days ({:.2}/day)",
            entity.identity, entity.popularity, c.age_days, c.growth_rate
        ),
        AlertCategory::HighValue => format!(
            "{} is established with {} stars (+{} since last check)",
            entity.identity, entity.popularity, candidate.change.popularity_delta
        ),
        AlertCategory::Informational => format!(
            "{} matches watched topics (relevance {:.1})",
            entity.identity,
            candidate.relevance.unwrap_or_default()
        ),
    };

    Alert {
        entity_identity: entity.identity.clone(),
        category,
        priority,
        summary,
        url: entity.url.clone(),
        popularity: entity.popularity,
        growth_rate: c.growth_rate,
        generated_at: now,
    }
}
