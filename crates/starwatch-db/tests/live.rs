//! Live integration tests for starwatch-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/starwatch-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use starwatch_core::{
    AlertCategory, AlertPolicyConfig, Category, Observation, Priority, RawObservation, Thresholds,
};
use starwatch_db::{
    append_alerts, complete_watch_run, create_watch_run, fail_watch_run, get_entity,
    get_watch_run, list_category_counts, list_history, list_recent_alerts, list_top_by_growth,
    list_watch_runs, record_classification, run_tracked_cycle, start_watch_run, upsert_entity,
    DbError, PgEntityStore, RunCounts,
};
use starwatch_engine::{run_cycle, CycleConfig, EntityStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
}

fn observation(identity: &str, popularity: i64, secondary_count: i64) -> Observation {
    Observation {
        identity: identity.to_string(),
        popularity,
        secondary_count,
        created_at: Some(t0() - Duration::days(5)),
        url: Some(format!("https://github.com/{identity}")),
        description: Some("test repository".to_string()),
        language: Some("Rust".to_string()),
        source_label: Some("tools".to_string()),
        topics: vec!["cli".to_string()],
        relevance: None,
        metadata: BTreeMap::from([("query".to_string(), "claude code cli".to_string())]),
    }
}

fn alert(identity: &str) -> starwatch_core::Alert {
    starwatch_core::Alert {
        entity_identity: identity.to_string(),
        category: AlertCategory::Rising,
        priority: Priority::High,
        summary: format!("{identity} is rising"),
        url: None,
        popularity: 10,
        growth_rate: 2.0,
        generated_at: t0(),
    }
}

// ---------------------------------------------------------------------------
// Section 1: Entity upserts and history
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn first_upsert_creates_entity_without_history(pool: sqlx::PgPool) {
    let outcome = upsert_entity(&pool, &observation("acme/widget", 50, 3), t0())
        .await
        .expect("upsert_entity failed");
    assert!(outcome.created);
    assert!(outcome.previous_popularity.is_none());

    let entity = get_entity(&pool, "acme/widget")
        .await
        .expect("get_entity failed")
        .expect("entity should exist");
    assert_eq!(entity.popularity, 50);
    assert_eq!(entity.first_seen, t0());
    assert_eq!(entity.created_at, t0() - Duration::days(5));
    assert!(entity.category.is_none());
    assert_eq!(entity.metadata.get("query").map(String::as_str), Some("claude code cli"));

    let history = list_history(&pool, "acme/widget", 10)
        .await
        .expect("list_history failed");
    assert!(history.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_appends_pre_update_counts(pool: sqlx::PgPool) {
    let t1 = t0() + Duration::hours(6);
    upsert_entity(&pool, &observation("acme/widget", 50, 3), t0())
        .await
        .expect("first upsert failed");
    let outcome = upsert_entity(&pool, &observation("acme/widget", 70, 4), t1)
        .await
        .expect("second upsert failed");
    assert!(!outcome.created);
    assert_eq!(outcome.previous_popularity, Some(50));

    let history = list_history(&pool, "acme/widget", 10)
        .await
        .expect("list_history failed");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].popularity, 50);
    assert_eq!(history[0].secondary_count, 3);
    assert_eq!(history[0].observed_at, t0());

    let entity = get_entity(&pool, "acme/widget").await.unwrap().unwrap();
    assert_eq!(entity.popularity, 70);
    assert_eq!(entity.secondary_count, 4);
    assert_eq!(entity.first_seen, t0());
    assert_eq!(entity.last_updated, t1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn popularity_is_clamped_non_decreasing(pool: sqlx::PgPool) {
    upsert_entity(&pool, &observation("acme/widget", 50, 3), t0())
        .await
        .unwrap();
    upsert_entity(
        &pool,
        &observation("acme/widget", 45, 3),
        t0() + Duration::hours(1),
    )
    .await
    .unwrap();
    let entity = get_entity(&pool, "acme/widget").await.unwrap().unwrap();
    assert_eq!(entity.popularity, 50);
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_upserts_of_one_identity_serialize(pool: sqlx::PgPool) {
    let obs = observation("acme/race", 10, 0);
    let (a, b) = tokio::join!(
        upsert_entity(&pool, &obs, t0()),
        upsert_entity(&pool, &obs, t0())
    );
    let created = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|o| o.created)
        .count();
    assert_eq!(created, 1);
    assert_eq!(list_history(&pool, "acme/race", 10).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn classification_is_persisted_and_queryable(pool: sqlx::PgPool) {
    upsert_entity(&pool, &observation("acme/fast", 50, 0), t0())
        .await
        .unwrap();
    upsert_entity(&pool, &observation("acme/slow", 500, 0), t0())
        .await
        .unwrap();
    record_classification(&pool, "acme/fast", 10.0, Category::Rising)
        .await
        .unwrap();
    record_classification(&pool, "acme/slow", 1.25, Category::Established)
        .await
        .unwrap();

    let rising = list_top_by_growth(&pool, Some(Category::Rising), 10)
        .await
        .unwrap();
    assert_eq!(rising.len(), 1);
    assert_eq!(rising[0].identity, "acme/fast");

    let all = list_top_by_growth(&pool, None, 10).await.unwrap();
    assert_eq!(all.len(), 2);

    let counts = list_category_counts(&pool).await.unwrap();
    assert_eq!(counts.len(), 2);
    assert!(counts.iter().all(|c| c.count == 1));
}

#[sqlx::test(migrations = "../../migrations")]
async fn classifying_missing_entity_is_corrupt(pool: sqlx::PgPool) {
    let err = record_classification(&pool, "nobody/here", 1.0, Category::Watching)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::CorruptRow { .. }));
}

// ---------------------------------------------------------------------------
// Section 2: Alert log
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn alert_log_is_newest_first_and_capped(pool: sqlx::PgPool) {
    append_alerts(&pool, &[alert("a/1"), alert("a/2")], 3)
        .await
        .unwrap();
    append_alerts(&pool, &[alert("a/3"), alert("a/4")], 3)
        .await
        .unwrap();

    let ids: Vec<_> = list_recent_alerts(&pool, 10)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.entity_identity)
        .collect();
    assert_eq!(ids, ["a/3", "a/4", "a/1"]);
}

// ---------------------------------------------------------------------------
// Section 3: Watch run lifecycle
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn watch_run_lifecycle_queued_to_succeeded(pool: sqlx::PgPool) {
    let run = create_watch_run(&pool, "cli").await.unwrap();
    assert_eq!(run.status, "queued");
    assert!(run.started_at.is_none());

    start_watch_run(&pool, run.id).await.unwrap();
    complete_watch_run(
        &pool,
        run.id,
        RunCounts {
            received: 30,
            created: 20,
            updated: 9,
            rejected: 1,
            alerts_emitted: 4,
            ..RunCounts::default()
        },
    )
    .await
    .unwrap();

    let fetched = get_watch_run(&pool, run.id).await.unwrap();
    assert_eq!(fetched.status, "succeeded");
    assert!(fetched.completed_at.is_some());
    assert_eq!(fetched.received, 30);
    assert_eq!(fetched.alerts_emitted, 4);
    assert_eq!(list_watch_runs(&pool, 10).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn watch_run_rejects_invalid_transition(pool: sqlx::PgPool) {
    let run = create_watch_run(&pool, "scheduler").await.unwrap();
    let err = fail_watch_run(&pool, run.id, "boom").await.unwrap_err();
    assert!(matches!(
        err,
        DbError::InvalidRunTransition {
            expected_status: "running",
            ..
        }
    ));
}

// ---------------------------------------------------------------------------
// Section 4: Full cycle through the engine
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn engine_cycle_alerts_once_against_postgres(pool: sqlx::PgPool) {
    let store = PgEntityStore::from_pool(pool);
    let config =
        CycleConfig::new(Thresholds::default(), AlertPolicyConfig::default(), 100).unwrap();
    let raw = RawObservation {
        identity: Some("Acme/Widget".to_string()),
        popularity: 50,
        created_at: Some(t0() - Duration::days(5)),
        ..RawObservation::default()
    };

    let first = run_cycle(&store, vec![raw.clone()], &config, t0())
        .await
        .unwrap();
    assert_eq!(first.alerts.len(), 1);

    let second = run_cycle(&store, vec![raw], &config, t0() + Duration::hours(1))
        .await
        .unwrap();
    assert!(second.alerts.is_empty());

    let entity = store.get("acme/widget").await.unwrap().unwrap();
    assert_eq!(entity.category, Some(Category::Rising));
    assert_eq!(store.recent_alerts(10).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn tracked_cycle_records_counts_on_the_run(pool: sqlx::PgPool) {
    let store = PgEntityStore::from_pool(pool.clone());
    let config =
        CycleConfig::new(Thresholds::default(), AlertPolicyConfig::default(), 100).unwrap();
    let raws = vec![
        RawObservation {
            identity: Some("acme/widget".to_string()),
            popularity: 50,
            created_at: Some(t0() - Duration::days(5)),
            ..RawObservation::default()
        },
        RawObservation {
            identity: Some("   ".to_string()),
            popularity: 10,
            ..RawObservation::default()
        },
    ];

    let tracked = run_tracked_cycle(&store, "cli", raws, &config, t0())
        .await
        .expect("tracked cycle failed");
    assert_eq!(tracked.summary.alerts_emitted(), 1);

    let run = get_watch_run(&pool, tracked.run_id).await.unwrap();
    assert_eq!(run.status, "succeeded");
    assert_eq!(run.trigger_source, "cli");
    assert_eq!(run.received, 2);
    assert_eq!(run.rejected, 1);
    assert_eq!(run.created, 1);
    assert_eq!(run.alerts_emitted, 1);
}
