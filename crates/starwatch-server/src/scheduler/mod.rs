//! Background job scheduler.
//!
//! Registers the recurring watch job at server startup. The job searches
//! GitHub for the configured watchlist, runs one recorded cycle and delivers
//! the resulting alerts.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use starwatch_core::AppConfig;
use starwatch_db::PgEntityStore;
use starwatch_engine::{dispatch_alerts, CycleConfig};
use starwatch_github::GithubClient;
use starwatch_notify::Notifier;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the scheduler. The returned handle must be kept alive;
/// dropping it stops all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_watch_job(&scheduler, pool, config).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_watch_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let store = Arc::new(PgEntityStore::from_pool(pool));
    // one cycle at a time; a tick that finds the previous run still going is skipped
    let running = Arc::new(Mutex::new(()));
    let cron = config.watch_cron.clone();

    let job = Job::new_async(cron.as_str(), move |_uuid, _lock| {
        let store = Arc::clone(&store);
        let config = Arc::clone(&config);
        let running = Arc::clone(&running);

        Box::pin(async move {
            let Ok(_guard) = running.try_lock() else {
                tracing::warn!("scheduler: previous watch run still in progress; skipping tick");
                return;
            };
            tracing::info!("scheduler: starting watch run");
            run_watch_job(&store, &config).await;
            tracing::info!("scheduler: watch run finished");
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = %cron, "scheduler: watch job registered");
    Ok(())
}

async fn run_watch_job(store: &PgEntityStore, config: &AppConfig) {
    let watchlist = match starwatch_core::load_watchlist(&config.watchlist_path) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to load watchlist");
            return;
        }
    };

    let client = match GithubClient::from_app_config(config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: failed to build GitHub client");
            return;
        }
    };

    let observations = match client.fetch_observations(&watchlist.queries).await {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: GitHub fetch failed; skipping cycle");
            return;
        }
    };

    let cycle_config = match CycleConfig::from_app_config(config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: invalid alert policy configuration");
            return;
        }
    };

    let tracked = match starwatch_db::run_tracked_cycle(
        store,
        "scheduler",
        observations,
        &cycle_config,
        Utc::now(),
    )
    .await
    {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "scheduler: watch cycle failed");
            return;
        }
    };

    match Notifier::from_config(&config.notify, &config.http) {
        Ok(notifier) => {
            dispatch_alerts(&notifier, &tracked.summary.alerts).await;
        }
        Err(e) => tracing::error!(error = %e, "scheduler: failed to build notifier"),
    }
}
