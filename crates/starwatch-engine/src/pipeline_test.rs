use std::sync::Mutex as StdMutex;

use chrono::{Duration, TimeZone};
use starwatch_core::{AlertCategory, Category, CategoryCount, Observation, ObservationRecord, Priority, TrackedEntity};

use super::*;
use crate::store::MemoryStore;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 20, 6, 0, 0).unwrap()
}

fn config() -> CycleConfig {
    CycleConfig::new(Thresholds::default(), AlertPolicyConfig::default(), 100).unwrap()
}

fn raw(identity: &str, popularity: i64, age_days: i64) -> RawObservation {
    RawObservation {
        identity: Some(identity.to_string()),
        popularity,
        secondary_count: 2,
        created_at: Some(now() - Duration::days(age_days)),
        url: Some(format!("https://github.com/{identity}")),
        ..RawObservation::default()
    }
}

#[tokio::test]
async fn young_repo_alerts_once_then_goes_quiet() {
    let store = MemoryStore::new();
    let cfg = config();

    let first = run_cycle(&store, vec![raw("acme/widget", 50, 5)], &cfg, now())
        .await
        .unwrap();
    assert_eq!(first.created, 1);
    assert_eq!(first.alerts.len(), 1);
    let alert = &first.alerts[0];
    assert_eq!(alert.entity_identity, "acme/widget");
    assert_eq!(alert.category, AlertCategory::Rising);
    assert_eq!(alert.priority, Priority::Normal);
    assert!((alert.growth_rate - 10.0).abs() < f64::EPSILON);

    let entity = store.get("acme/widget").await.unwrap().unwrap();
    assert_eq!(entity.category, Some(Category::Rising));

    let later = now() + Duration::hours(1);
    let second = run_cycle(&store, vec![raw("acme/widget", 50, 5)], &cfg, later)
        .await
        .unwrap();
    assert_eq!(second.updated, 1);
    assert_eq!(second.significant_changes, 0);
    assert!(second.alerts.is_empty());
    assert_eq!(store.history("acme/widget", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn old_popular_repo_is_high_value() {
    let store = MemoryStore::new();
    let summary = run_cycle(&store, vec![raw("acme/oldtimer", 500, 400)], &config(), now())
        .await
        .unwrap();
    assert_eq!(summary.alerts.len(), 1);
    assert_eq!(summary.alerts[0].category, AlertCategory::HighValue);
    let entity = store.get("acme/oldtimer").await.unwrap().unwrap();
    assert_eq!(entity.category, Some(Category::Established));
    assert!((entity.growth_rate - 1.25).abs() < f64::EPSILON);
}

#[tokio::test]
async fn per_run_cap_reports_candidates_not_emitted() {
    let store = MemoryStore::new();
    let cfg = CycleConfig::new(
        Thresholds::default(),
        AlertPolicyConfig {
            max_alerts_per_run: 10,
            ..AlertPolicyConfig::default()
        },
        100,
    )
    .unwrap();
    let raws: Vec<_> = (0..15)
        .map(|i| raw(&format!("org/repo-{i:02}"), 50 + i, 5))
        .collect();

    let summary = run_cycle(&store, raws, &cfg, now()).await.unwrap();
    assert_eq!(summary.alerts_emitted(), 10);
    assert_eq!(summary.candidates_not_emitted(), 5);
    assert_eq!(summary.alerts[0].entity_identity, "org/repo-14");
    assert_eq!(store.recent_alerts(100).await.unwrap().len(), 10);
}

#[tokio::test]
async fn blank_identity_is_rejected_without_creating_anything() {
    let store = MemoryStore::new();
    let summary = run_cycle(
        &store,
        vec![RawObservation {
            identity: Some(String::new()),
            popularity: 10,
            ..RawObservation::default()
        }],
        &config(),
        now(),
    )
    .await
    .unwrap();
    assert_eq!(summary.received, 1);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.created, 0);
    assert_eq!(store.entity_count().await, 0);
}

#[tokio::test]
async fn future_created_at_is_skipped_and_counted() {
    let store = MemoryStore::new();
    let mut skewed = raw("acme/skewed", 80, 0);
    skewed.created_at = Some(now() + Duration::days(3));

    let summary = run_cycle(
        &store,
        vec![skewed, raw("acme/fine", 50, 5)],
        &config(),
        now(),
    )
    .await
    .unwrap();
    assert_eq!(summary.created, 2);
    assert_eq!(summary.classification_errors, 1);
    assert_eq!(summary.classified, 1);
    assert_eq!(summary.alerts.len(), 1);
    assert_eq!(summary.alerts[0].entity_identity, "acme/fine");

    let skewed = store.get("acme/skewed").await.unwrap().unwrap();
    assert!(skewed.category.is_none());
}

#[tokio::test]
async fn ten_percent_growth_realerts() {
    let store = MemoryStore::new();
    let cfg = config();
    run_cycle(&store, vec![raw("acme/grower", 200, 30)], &cfg, now())
        .await
        .unwrap();

    let later = now() + Duration::hours(6);
    let small = run_cycle(&store, vec![raw("acme/grower", 210, 30)], &cfg, later)
        .await
        .unwrap();
    assert!(small.alerts.is_empty());

    let big = run_cycle(&store, vec![raw("acme/grower", 240, 30)], &cfg, later)
        .await
        .unwrap();
    assert_eq!(big.alerts.len(), 1);
    assert_eq!(big.alerts[0].category, AlertCategory::Rising);
}

#[tokio::test]
async fn duplicate_identities_in_batch_keep_the_later_observation() {
    let store = MemoryStore::new();
    let summary = run_cycle(
        &store,
        vec![raw("Acme/Widget", 20, 5), raw("acme/widget ", 60, 5)],
        &config(),
        now(),
    )
    .await
    .unwrap();
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(store.get("acme/widget").await.unwrap().unwrap().popularity, 60);
}

#[tokio::test]
async fn relevance_score_yields_informational_alert() {
    let store = MemoryStore::new();
    let cfg = config();
    let mut quiet = raw("acme/quiet", 3, 300);
    quiet.relevance = Some(55.0);
    let summary = run_cycle(&store, vec![quiet], &cfg, now()).await.unwrap();
    assert_eq!(summary.alerts.len(), 1);
    assert_eq!(summary.alerts[0].category, AlertCategory::Informational);
}

/// Wraps a `MemoryStore` and records the order of store calls.
struct RecordingStore {
    inner: MemoryStore,
    calls: StdMutex<Vec<&'static str>>,
}

impl RecordingStore {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

impl EntityStore for RecordingStore {
    async fn upsert(
        &self,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        self.record("upsert");
        self.inner.upsert(observation, now).await
    }

    async fn get(&self, identity: &str) -> Result<Option<TrackedEntity>, StoreError> {
        self.record("get");
        self.inner.get(identity).await
    }

    async fn history(
        &self,
        identity: &str,
        limit: usize,
    ) -> Result<Vec<ObservationRecord>, StoreError> {
        self.inner.history(identity, limit).await
    }

    async fn record_classification(
        &self,
        identity: &str,
        growth_rate: f64,
        category: Category,
    ) -> Result<(), StoreError> {
        self.record("classify");
        self.inner
            .record_classification(identity, growth_rate, category)
            .await
    }

    async fn append_alerts(&self, alerts: &[Alert], cap: usize) -> Result<(), StoreError> {
        self.record("alerts");
        self.inner.append_alerts(alerts, cap).await
    }

    async fn recent_alerts(&self, limit: usize) -> Result<Vec<Alert>, StoreError> {
        self.inner.recent_alerts(limit).await
    }

    async fn top_by_popularity(&self, limit: usize) -> Result<Vec<TrackedEntity>, StoreError> {
        self.inner.top_by_popularity(limit).await
    }

    async fn top_by_growth(
        &self,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<TrackedEntity>, StoreError> {
        self.inner.top_by_growth(category, limit).await
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError> {
        self.inner.category_counts().await
    }
}

#[tokio::test]
async fn all_upserts_commit_before_any_classification() {
    let store = RecordingStore {
        inner: MemoryStore::new(),
        calls: StdMutex::new(Vec::new()),
    };
    run_cycle(
        &store,
        vec![raw("a/one", 50, 5), raw("a/two", 60, 5), raw("a/three", 70, 5)],
        &config(),
        now(),
    )
    .await
    .unwrap();

    let calls = store.calls.lock().unwrap().clone();
    let last_upsert = calls.iter().rposition(|c| *c == "upsert").unwrap();
    let first_get = calls.iter().position(|c| *c == "get").unwrap();
    assert!(last_upsert < first_get, "calls: {calls:?}");
    assert_eq!(calls.last(), Some(&"alerts"));
}

/// A store whose backend is gone.
struct DownStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

impl EntityStore for DownStore {
    async fn upsert(&self, _: &Observation, _: DateTime<Utc>) -> Result<UpsertOutcome, StoreError> {
        Err(down())
    }

    async fn get(&self, _: &str) -> Result<Option<TrackedEntity>, StoreError> {
        Err(down())
    }

    async fn history(&self, _: &str, _: usize) -> Result<Vec<ObservationRecord>, StoreError> {
        Err(down())
    }

    async fn record_classification(&self, _: &str, _: f64, _: Category) -> Result<(), StoreError> {
        Err(down())
    }

    async fn append_alerts(&self, _: &[Alert], _: usize) -> Result<(), StoreError> {
        Err(down())
    }

    async fn recent_alerts(&self, _: usize) -> Result<Vec<Alert>, StoreError> {
        Err(down())
    }

    async fn top_by_popularity(&self, _: usize) -> Result<Vec<TrackedEntity>, StoreError> {
        Err(down())
    }

    async fn top_by_growth(
        &self,
        _: Option<Category>,
        _: usize,
    ) -> Result<Vec<TrackedEntity>, StoreError> {
        Err(down())
    }

    async fn category_counts(&self) -> Result<Vec<CategoryCount>, StoreError> {
        Err(down())
    }
}

#[tokio::test]
async fn unavailable_store_aborts_the_cycle() {
    let err = run_cycle(&DownStore, vec![raw("a/one", 50, 5)], &config(), now())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RunError::StoreUnavailable(StoreError::Unavailable(_))
    ));
}

#[tokio::test]
async fn empty_batch_is_a_quiet_success() {
    let store = MemoryStore::new();
    let summary = run_cycle(&store, Vec::new(), &config(), now()).await.unwrap();
    assert_eq!(summary.received, 0);
    assert!(summary.alerts.is_empty());
    assert!(store.recent_alerts(10).await.unwrap().is_empty());
}
