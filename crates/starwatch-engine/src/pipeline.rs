//! One watch cycle: ingest, upsert, classify, detect, apply the alert policy.

use chrono::{DateTime, Utc};
use serde::Serialize;
use starwatch_core::{Alert, AlertPolicyConfig, AppConfig, RawObservation, Thresholds};

use crate::classifier::{classify, ClassifierInput};
use crate::detector::{detect, DetectorInput};
use crate::error::{PolicyError, RunError, StoreError};
use crate::ingest::ingest_batch;
use crate::policy::{AlertCandidate, AlertPolicy};
use crate::store::{EntityStore, UpsertOutcome};

/// Static inputs for a cycle.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub thresholds: Thresholds,
    pub policy: AlertPolicy,
    pub alert_log_cap: usize,
}

impl CycleConfig {
    /// # Errors
    ///
    /// Returns [`PolicyError`] if the priority keywords cannot be compiled.
    pub fn new(
        thresholds: Thresholds,
        policy: AlertPolicyConfig,
        alert_log_cap: usize,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            thresholds,
            policy: AlertPolicy::new(policy)?,
            alert_log_cap,
        })
    }

    /// # Errors
    ///
    /// Returns [`PolicyError`] if the priority keywords cannot be compiled.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, PolicyError> {
        Self::new(
            config.thresholds.clone(),
            config.alert_policy.clone(),
            config.alert_log_cap,
        )
    }
}

/// Counters and alerts produced by one cycle. Every received observation is
/// accounted for in exactly one of `rejected`, `duplicates`, `created` or
/// `updated`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub received: usize,
    pub rejected: usize,
    pub duplicates: usize,
    pub created: usize,
    pub updated: usize,
    pub classified: usize,
    pub classification_errors: usize,
    pub significant_changes: usize,
    pub alerts: Vec<Alert>,
    pub not_emitted: Vec<Alert>,
}

impl RunSummary {
    #[must_use]
    pub fn alerts_emitted(&self) -> usize {
        self.alerts.len()
    }

    #[must_use]
    pub fn candidates_not_emitted(&self) -> usize {
        self.not_emitted.len()
    }
}

fn fatal(err: StoreError) -> RunError {
    tracing::error!(error = %err, "entity store unavailable, aborting cycle");
    RunError::StoreUnavailable(err)
}

/// Run one cycle against `store`.
///
/// Every upsert of the batch completes before any entity is classified. A
/// classification failure or a corrupt record skips that entity and is
/// counted; an unavailable store aborts the cycle.
///
/// # Errors
///
/// Returns [`RunError::StoreUnavailable`] when the store cannot be read or
/// written.
pub async fn run_cycle<S: EntityStore>(
    store: &S,
    raws: Vec<RawObservation>,
    config: &CycleConfig,
    now: DateTime<Utc>,
) -> Result<RunSummary, RunError> {
    let batch = ingest_batch(raws);
    let mut summary = RunSummary {
        received: batch.received,
        rejected: batch.rejections.len(),
        duplicates: batch.duplicates,
        ..RunSummary::default()
    };

    // Phase 1: persist the whole batch.
    let mut touched: Vec<(String, UpsertOutcome, Option<f64>)> =
        Vec::with_capacity(batch.observations.len());
    for observation in &batch.observations {
        let outcome = store.upsert(observation, now).await.map_err(fatal)?;
        if outcome.created {
            summary.created += 1;
        } else {
            summary.updated += 1;
        }
        touched.push((observation.identity.clone(), outcome, observation.relevance));
    }

    // Phase 2: classify and detect against the committed state.
    let margin = config.policy.config().significant_growth_margin;
    let mut candidates = Vec::with_capacity(touched.len());
    let mut skipped: Vec<(String, String)> = Vec::new();

    for (identity, outcome, relevance) in touched {
        let entity = match store.get(&identity).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                skipped.push((identity, "entity missing after upsert".to_string()));
                continue;
            }
            Err(StoreError::Corrupt { reason, .. }) => {
                skipped.push((identity, reason));
                continue;
            }
            Err(err) => return Err(fatal(err)),
        };

        let classification =
            match classify(ClassifierInput::from(&entity), &config.thresholds, now) {
                Ok(c) => c,
                Err(err) => {
                    skipped.push((identity, err.to_string()));
                    continue;
                }
            };

        let change = detect(
            &DetectorInput {
                previous_category: entity.category,
                previous_popularity: outcome.previous_popularity,
                current_popularity: entity.popularity,
                new_category: classification.category,
            },
            margin,
        );

        match store
            .record_classification(&identity, classification.growth_rate, classification.category)
            .await
        {
            Ok(()) => {}
            Err(StoreError::Corrupt { reason, .. }) => {
                skipped.push((identity, reason));
                continue;
            }
            Err(err) => return Err(fatal(err)),
        }

        summary.classified += 1;
        if change.is_significant {
            summary.significant_changes += 1;
            tracing::debug!(
                identity = %identity,
                old = ?change.old_category,
                new = %change.new_category,
                delta = change.popularity_delta,
                "significant change"
            );
        }

        candidates.push(AlertCandidate {
            entity,
            classification,
            change,
            relevance,
        });
    }

    for (identity, reason) in &skipped {
        tracing::warn!(identity = %identity, reason = %reason, "entity skipped during classification");
    }
    summary.classification_errors = skipped.len();

    let outcome = config.policy.evaluate(&candidates, now);
    if !outcome.emitted.is_empty() {
        store
            .append_alerts(&outcome.emitted, config.alert_log_cap)
            .await
            .map_err(fatal)?;
    }
    summary.alerts = outcome.emitted;
    summary.not_emitted = outcome.not_emitted;

    tracing::info!(
        received = summary.received,
        rejected = summary.rejected,
        created = summary.created,
        updated = summary.updated,
        classification_errors = summary.classification_errors,
        alerts = summary.alerts_emitted(),
        not_emitted = summary.candidates_not_emitted(),
        "watch cycle complete"
    );

    Ok(summary)
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
