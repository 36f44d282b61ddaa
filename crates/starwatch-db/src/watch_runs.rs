//! Database operations for `watch_runs`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use starwatch_engine::RunSummary;
use uuid::Uuid;

use crate::{sql_limit, DbError};

/// A row from the `watch_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WatchRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub received: i32,
    pub rejected: i32,
    pub created: i32,
    pub updated: i32,
    pub classification_errors: i32,
    pub alerts_emitted: i32,
    pub candidates_not_emitted: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Counters written when a run succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub received: i32,
    pub rejected: i32,
    pub created: i32,
    pub updated: i32,
    pub classification_errors: i32,
    pub alerts_emitted: i32,
    pub candidates_not_emitted: i32,
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl From<&RunSummary> for RunCounts {
    fn from(summary: &RunSummary) -> Self {
        Self {
            received: saturating_i32(summary.received),
            rejected: saturating_i32(summary.rejected),
            created: saturating_i32(summary.created),
            updated: saturating_i32(summary.updated),
            classification_errors: saturating_i32(summary.classification_errors),
            alerts_emitted: saturating_i32(summary.alerts_emitted()),
            candidates_not_emitted: saturating_i32(summary.candidates_not_emitted()),
        }
    }
}

const RUN_COLUMNS: &str = "id, public_id, trigger_source, status, started_at, completed_at, \
     received, rejected, created, updated, classification_errors, alerts_emitted, \
     candidates_not_emitted, error_message, created_at";

/// Creates a new watch run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_watch_run(pool: &PgPool, trigger_source: &str) -> Result<WatchRunRow, DbError> {
    let row = sqlx::query_as::<_, WatchRunRow>(&format!(
        "INSERT INTO watch_runs (public_id, trigger_source, status) \
         VALUES ($1, $2, 'queued') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `queued`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn start_watch_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE watch_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and stores its counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn complete_watch_run(pool: &PgPool, id: i64, counts: RunCounts) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE watch_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             received = $2, rejected = $3, created = $4, updated = $5, \
             classification_errors = $6, alerts_emitted = $7, candidates_not_emitted = $8 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(counts.received)
    .bind(counts.rejected)
    .bind(counts.created)
    .bind(counts.updated)
    .bind(counts.classification_errors)
    .bind(counts.alerts_emitted)
    .bind(counts.candidates_not_emitted)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed` and records the error.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn fail_watch_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE watch_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $2 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_watch_run(pool: &PgPool, id: i64) -> Result<WatchRunRow, DbError> {
    sqlx::query_as::<_, WatchRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM watch_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_watch_runs(pool: &PgPool, limit: usize) -> Result<Vec<WatchRunRow>, DbError> {
    let rows = sqlx::query_as::<_, WatchRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM watch_runs ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(sql_limit(limit))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_counts_copy_summary_counters() {
        let summary = RunSummary {
            received: 12,
            rejected: 1,
            created: 4,
            updated: 7,
            classification_errors: 2,
            ..RunSummary::default()
        };
        let counts = RunCounts::from(&summary);
        assert_eq!(counts.received, 12);
        assert_eq!(counts.rejected, 1);
        assert_eq!(counts.created, 4);
        assert_eq!(counts.updated, 7);
        assert_eq!(counts.classification_errors, 2);
        assert_eq!(counts.alerts_emitted, 0);
    }

    #[test]
    fn oversized_counts_saturate() {
        assert_eq!(saturating_i32(usize::MAX), i32::MAX);
    }
}
