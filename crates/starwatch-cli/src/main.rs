mod report;
mod watch;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use report::{AlertsCommands, ReportCommands, RunsCommands};
use watch::WatchCommands;

#[derive(Debug, Parser)]
#[command(name = "starwatch")]
#[command(about = "Track repository growth and alert on rising stars")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Fetch, classify and alert
    Watch {
        #[command(subcommand)]
        command: WatchCommands,
    },
    /// Read-only views of the watchlist
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
    /// Inspect the alert log
    Alerts {
        #[command(subcommand)]
        command: AlertsCommands,
    },
    /// Show recorded popularity history for one entity
    History {
        /// Entity identity, e.g. `owner/repo`
        identity: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Inspect recorded watch runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

/// Dry runs never touch the database, so they are routed before a pool exists.
fn is_dry_run(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Watch {
            command: WatchCommands::Run { dry_run: true }
        }
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("starwatch: no command given; see `starwatch --help`");
        return Ok(());
    };

    let config = starwatch_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if is_dry_run(&command) {
        return watch::run_watch_dry(&config).await;
    }

    let pool_config = starwatch_db::PoolConfig::from_app_config(&config);
    let pool = starwatch_db::connect_pool(&config.database_url, pool_config).await?;

    let result = match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            starwatch_db::ping(&pool).await?;
            println!("database reachable");
            Ok(())
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = starwatch_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Commands::Watch { command } => watch::dispatch(pool.clone(), &config, command).await,
        Commands::Report { command } => report::dispatch_report(&pool, command).await,
        Commands::Alerts {
            command: AlertsCommands::Recent { limit },
        } => report::run_alerts_recent(&pool, limit).await,
        Commands::History { identity, limit } => {
            report::run_history(&pool, &identity, limit).await
        }
        Commands::Runs {
            command: RunsCommands::List { limit },
        } => report::run_runs_list(&pool, limit).await,
    };

    pool.close().await;
    result
}
