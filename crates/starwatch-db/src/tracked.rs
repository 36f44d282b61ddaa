//! A watch cycle recorded in `watch_runs`.

use chrono::{DateTime, Utc};
use starwatch_core::RawObservation;
use starwatch_engine::{run_cycle, CycleConfig, RunSummary};

use crate::store::PgEntityStore;
use crate::watch_runs::{complete_watch_run, create_watch_run, fail_watch_run, start_watch_run};
use crate::{DbError, RunCounts};

#[derive(Debug)]
pub struct TrackedRun {
    pub run_id: i64,
    pub summary: RunSummary,
}

/// Create a run, execute one cycle against `store`, and record the outcome.
///
/// The run moves queued → running → succeeded, or to failed with the error
/// message when any later step fails.
///
/// # Errors
///
/// Returns [`DbError`] if the run row cannot be created or updated, or
/// [`DbError::Cycle`] if the cycle aborted.
pub async fn run_tracked_cycle(
    store: &PgEntityStore,
    trigger_source: &str,
    raws: Vec<RawObservation>,
    config: &CycleConfig,
    now: DateTime<Utc>,
) -> Result<TrackedRun, DbError> {
    let pool = store.pool();
    let run = create_watch_run(pool, trigger_source).await?;
    if let Err(e) = start_watch_run(pool, run.id).await {
        fail_run_best_effort(store, run.id, &e.to_string()).await;
        return Err(e);
    }

    let summary = match run_cycle(store, raws, config, now).await {
        Ok(summary) => summary,
        Err(e) => {
            fail_run_best_effort(store, run.id, &e.to_string()).await;
            return Err(e.into());
        }
    };

    if let Err(e) = complete_watch_run(pool, run.id, RunCounts::from(&summary)).await {
        fail_run_best_effort(store, run.id, &e.to_string()).await;
        return Err(e);
    }

    tracing::info!(
        run_id = run.id,
        public_id = %run.public_id,
        trigger_source,
        received = summary.received,
        alerts = summary.alerts_emitted(),
        "watch run succeeded"
    );
    Ok(TrackedRun {
        run_id: run.id,
        summary,
    })
}

async fn fail_run_best_effort(store: &PgEntityStore, run_id: i64, message: &str) {
    if let Err(mark_err) = fail_watch_run(store.pool(), run_id, message).await {
        tracing::error!(run_id, error = %mark_err, "failed to mark watch run as failed");
    }
}
