//! The entity store seam and its in-memory implementation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;

use chrono::{DateTime, Utc};
use starwatch_core::{
    Alert, Category, CategoryCount, Observation, ObservationRecord, TrackedEntity,
};
use tokio::sync::Mutex;

use crate::error::StoreError;

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: bool,
    /// Popularity before this upsert. `None` when the entity was created.
    pub previous_popularity: Option<i64>,
}

/// Durable home of tracked entities, their observation history and the
/// alert log.
///
/// Upserts for the same identity are serialized by the implementation.
/// Once an `upsert` future resolves, the write is visible to every later read.
pub trait EntityStore: Send + Sync {
    /// Create the entity, or record its pre-update counts in history and then
    /// apply the new observation.
    fn upsert(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<UpsertOutcome, StoreError>> + Send;

    fn get(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<Option<TrackedEntity>, StoreError>> + Send;

    /// Newest-first observation history.
    fn history(
        &self,
        identity: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ObservationRecord>, StoreError>> + Send;

    /// Persist the derived growth rate and category.
    fn record_classification(
        &self,
        identity: &str,
        growth_rate: f64,
        category: Category,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Prepend `alerts` to the alert log (first alert ends up newest), then
    /// drop the oldest entries beyond `cap`.
    fn append_alerts(
        &self,
        alerts: &[Alert],
        cap: usize,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn recent_alerts(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Alert>, StoreError>> + Send;

    fn top_by_popularity(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TrackedEntity>, StoreError>> + Send;

    /// Highest growth rate first, optionally restricted to one category.
    fn top_by_growth(
        &self,
        category: Option<Category>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<TrackedEntity>, StoreError>> + Send;

    fn category_counts(
        &self,
    ) -> impl Future<Output = Result<Vec<CategoryCount>, StoreError>> + Send;
}

#[derive(Debug, Default)]
struct MemoryInner {
    entities: BTreeMap<String, TrackedEntity>,
    /// Oldest first per identity.
    history: HashMap<String, Vec<ObservationRecord>>,
    /// Newest first.
    alerts: VecDeque<Alert>,
}

/// In-process store used by tests and dry runs. One mutex guards the whole
/// store, so every write is serialized.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entity_count(&self) -> usize {
        self.inner.lock().await.entities.len()
    }
}

fn merge_optional(target: &mut Option<String>, incoming: Option<&String>) {
    if let Some(value) = incoming {
        *target = Some(value.clone());
    }
}

impl EntityStore for MemoryStore {
    async fn upsert(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let MemoryInner {
            entities, history, ..
        } = &mut *inner;

        let Some(entity) = entities.get_mut(&observation.identity) else {
            entities.insert(
                observation.identity.clone(),
                TrackedEntity {
                    identity: observation.identity.clone(),
                    url: observation.url.clone(),
                    description: observation.description.clone(),
                    language: observation.language.clone(),
                    source_label: observation.source_label.clone(),
                    topics: observation.topics.clone(),
                    metadata: observation.metadata.clone(),
                    popularity: observation.popularity,
                    secondary_count: observation.secondary_count,
                    created_at: observation.created_at.unwrap_or(now),
                    growth_rate: 0.0,
                    category: None,
                    first_seen: now,
                    last_updated: now,
                },
            );
            return Ok(UpsertOutcome {
                created: true,
                previous_popularity: None,
            });
        };

        history
            .entry(observation.identity.clone())
            .or_default()
            .push(ObservationRecord {
                identity: entity.identity.clone(),
                popularity: entity.popularity,
                secondary_count: entity.secondary_count,
                observed_at: entity.last_updated,
            });

        let previous_popularity = entity.popularity;
        entity.popularity = entity.popularity.max(observation.popularity);
        entity.secondary_count = observation.secondary_count;
        merge_optional(&mut entity.url, observation.url.as_ref());
        merge_optional(&mut entity.description, observation.description.as_ref());
        merge_optional(&mut entity.language, observation.language.as_ref());
        merge_optional(&mut entity.source_label, observation.source_label.as_ref());
        if !observation.topics.is_empty() {
            entity.topics.clone_from(&observation.topics);
        }
        entity
            .metadata
            .extend(observation.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        entity.last_updated = now;

        Ok(UpsertOutcome {
            created: false,
            previous_popularity: Some(previous_popularity),
        })
    }

    async fn get(&self, identity: &str) -> Result<Option<TrackedEntity>, StoreError> {
        Ok(self.inner.lock().await.entities.get(identity).cloned())
    }

    async fn history(
        &self,
        identity: &str,
        limit: usize,
    ) -> Result<Vec<ObservationRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .history
            .get(identity)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn record_classification(
        &self,
        identity: &str,
        growth_rate: f64,
        category: Category,
    ) -> Result<(), StoreError> {
        if !growth_rate.is_finite() || growth_rate < 0.0 {
            return Err(StoreError::Corrupt {
                identity: identity.to_string(),
                reason: format!("growth rate {growth_rate} out of range"),
            });
        }
        let mut inner = self.inner.lock().await;
        let entity = inner
            .entities
            .get_mut(identity)
            .ok_or_else(|| StoreError::Corrupt {
                identity: identity.to_string(),
                reason: "entity not found".to_string(),
            })?;
        entity.growth_rate = growth_rate;
        entity.category = Some(category);
        Ok(())
    }

    async fn append_alerts(&self, alerts: &[Alert], cap: usize) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for alert in alerts.iter().rev() {
            inner.alerts.push_front(alert.clone());
        }
        inner.alerts.truncate(cap);
        Ok(())
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.alerts.iter().take(limit).cloned().collect())
    }

    async fn top_by_popularity(&self, limit: usize) -> Result<Vec<TrackedEntity>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entities: Vec<_> = inner.entities.values().cloned().collect();
        entities.sort_by(|a, b| {
            b.popularity
                .cmp(&a.popularity)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        entities.truncate(limit);
        Ok(entities)
    }

    async fn top_by_growth(
        &self,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<TrackedEntity>, StoreError> {
        let inner = self.inner.lock().await;
        let mut entities: Vec<_> = inner
            .entities
            .values()
            .filter(|e| category.is_none() || e.category == category)
            .cloned()
            .collect();
        entities.sort_by(|a, b| {
            b.growth_rate
                .total_cmp(&a.growth_rate)
                .then_with(|| a.identity.cmp(&b.identity))
        });
        entities.truncate(limit);
        Ok(entities)
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError> {
        let inner = self.inner.lock().await;
        // popularity sums are widened so a category of huge counts cannot overflow
        let mut groups: BTreeMap<Option<&'static str>, (Option<Category>, i64, i128)> =
            BTreeMap::new();
        for entity in inner.entities.values() {
            let slot = groups
                .entry(entity.category.map(Category::as_str))
                .or_insert((entity.category, 0, 0));
            slot.1 += 1;
            slot.2 += i128::from(entity.popularity);
        }
        #[allow(clippy::cast_precision_loss)]
        let counts = groups
            .into_values()
            .map(|(category, count, total)| CategoryCount {
                category,
                count,
                avg_popularity: total as f64 / count as f64,
            })
            .collect();
        Ok(counts)
    }
}
