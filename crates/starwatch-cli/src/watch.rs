//! `watch` command handlers: fetch observations, run a cycle, deliver alerts.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use starwatch_core::{AppConfig, RawObservation};
use starwatch_db::PgEntityStore;
use starwatch_engine::{
    dispatch_alerts, run_cycle, ChannelOutcome, CycleConfig, MemoryStore, RunSummary,
};
use starwatch_github::GithubClient;
use starwatch_notify::Notifier;

#[derive(Debug, Subcommand)]
pub enum WatchCommands {
    /// Search GitHub for every watchlist query and run one cycle
    Run {
        /// Classify against an in-memory store; no database writes, no notifications
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one cycle over observations read from a JSON file
    Ingest {
        /// JSON array of observations
        #[arg(long)]
        file: PathBuf,
    },
}

/// Dry runs are handled by [`run_watch_dry`] before a pool exists.
pub(crate) async fn dispatch(
    pool: sqlx::PgPool,
    config: &AppConfig,
    command: WatchCommands,
) -> anyhow::Result<()> {
    let store = PgEntityStore::from_pool(pool);
    match command {
        WatchCommands::Run { .. } => run_watch(&store, config).await,
        WatchCommands::Ingest { file } => run_ingest_file(&store, config, &file).await,
    }
}

async fn fetch_observations(config: &AppConfig) -> anyhow::Result<Vec<RawObservation>> {
    let watchlist = starwatch_core::load_watchlist(&config.watchlist_path)?;
    let client = GithubClient::from_app_config(config)?;
    Ok(client.fetch_observations(&watchlist.queries).await?)
}

async fn run_watch(store: &PgEntityStore, config: &AppConfig) -> anyhow::Result<()> {
    let raws = fetch_observations(config).await?;
    run_and_deliver(store, config, "cli", raws).await
}

pub(crate) async fn run_watch_dry(config: &AppConfig) -> anyhow::Result<()> {
    let raws = fetch_observations(config).await?;
    let cycle_config = CycleConfig::from_app_config(config)?;
    let summary = run_cycle(&MemoryStore::new(), raws, &cycle_config, Utc::now()).await?;

    println!("dry-run: nothing written, no notifications sent");
    print_summary(&summary, &[]);
    Ok(())
}

async fn run_ingest_file(
    store: &PgEntityStore,
    config: &AppConfig,
    path: &Path,
) -> anyhow::Result<()> {
    let raws = read_observations(path)?;
    run_and_deliver(store, config, "file", raws).await
}

fn read_observations(path: &Path) -> anyhow::Result<Vec<RawObservation>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of observations", path.display()))
}

async fn run_and_deliver(
    store: &PgEntityStore,
    config: &AppConfig,
    trigger_source: &str,
    raws: Vec<RawObservation>,
) -> anyhow::Result<()> {
    let cycle_config = CycleConfig::from_app_config(config)?;
    let tracked =
        starwatch_db::run_tracked_cycle(store, trigger_source, raws, &cycle_config, Utc::now())
            .await?;

    let notifier = Notifier::from_config(&config.notify, &config.http)?;
    let outcomes = dispatch_alerts(&notifier, &tracked.summary.alerts).await;

    println!("run {}", tracked.run_id);
    print_summary(&tracked.summary, &outcomes);
    Ok(())
}

fn print_summary(summary: &RunSummary, outcomes: &[ChannelOutcome]) {
    println!(
        "received {}  rejected {}  duplicates {}  created {}  updated {}",
        summary.received, summary.rejected, summary.duplicates, summary.created, summary.updated
    );
    println!(
        "classified {}  classification errors {}  significant changes {}",
        summary.classified, summary.classification_errors, summary.significant_changes
    );
    println!(
        "alerts {}  not emitted {}",
        summary.alerts_emitted(),
        summary.candidates_not_emitted()
    );
    for alert in &summary.alerts {
        println!(
            "  [{}|{}] {}",
            alert.priority, alert.category, alert.summary
        );
    }
    for outcome in outcomes {
        println!("  {:<10}{}", outcome.channel, outcome.status);
    }
}
