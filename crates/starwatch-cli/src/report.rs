//! Read-only report, alert, history and run queries.

use clap::Subcommand;
use starwatch_core::{Category, TrackedEntity};

#[derive(Debug, Subcommand)]
pub enum ReportCommands {
    /// Category breakdown, top rising and most popular entities
    Summary,
    /// Rising entities ordered by growth rate
    Rising {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Most popular entities
    Top {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Entity counts and average popularity per category
    Categories,
}

#[derive(Debug, Subcommand)]
pub enum AlertsCommands {
    /// Newest alerts first
    Recent {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum RunsCommands {
    /// Newest watch runs first
    List {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

const SUMMARY_SECTION_LIMIT: usize = 5;

pub(crate) async fn dispatch_report(
    pool: &sqlx::PgPool,
    command: ReportCommands,
) -> anyhow::Result<()> {
    match command {
        ReportCommands::Summary => run_summary(pool).await,
        ReportCommands::Rising { limit } => {
            let rising = starwatch_db::list_top_by_growth(pool, Some(Category::Rising), limit).await?;
            print_entities(&rising);
            Ok(())
        }
        ReportCommands::Top { limit } => {
            let top = starwatch_db::list_top_by_popularity(pool, limit).await?;
            print_entities(&top);
            Ok(())
        }
        ReportCommands::Categories => run_categories(pool).await,
    }
}

async fn run_summary(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    run_categories(pool).await?;

    println!();
    println!("Top rising");
    let rising =
        starwatch_db::list_top_by_growth(pool, Some(Category::Rising), SUMMARY_SECTION_LIMIT)
            .await?;
    print_entities(&rising);

    println!();
    println!("Most popular");
    let top = starwatch_db::list_top_by_popularity(pool, SUMMARY_SECTION_LIMIT).await?;
    print_entities(&top);
    Ok(())
}

async fn run_categories(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let counts = starwatch_db::list_category_counts(pool).await?;
    if counts.is_empty() {
        println!("no entities tracked yet; run `watch run` first");
        return Ok(());
    }

    println!("{:<14}{:>8}{:>16}", "CATEGORY", "COUNT", "AVG STARS");
    for row in &counts {
        let name = row.category.map_or("unclassified", Category::as_str);
        println!("{:<14}{:>8}{:>16.1}", name, row.count, row.avg_popularity);
    }
    Ok(())
}

fn print_entities(entities: &[TrackedEntity]) {
    if entities.is_empty() {
        println!("no entities found");
        return;
    }
    println!(
        "{:<45}{:>9}{:>11}  {:<13}LABEL",
        "IDENTITY", "STARS", "STARS/DAY", "CATEGORY"
    );
    for e in entities {
        println!(
            "{:<45}{:>9}{:>11.2}  {:<13}{}",
            truncate(&e.identity, 44),
            e.popularity,
            e.growth_rate,
            e.category.map_or("\u{2014}", Category::as_str),
            e.source_label.as_deref().unwrap_or("\u{2014}")
        );
    }
}

pub(crate) async fn run_alerts_recent(pool: &sqlx::PgPool, limit: usize) -> anyhow::Result<()> {
    let alerts = starwatch_db::list_recent_alerts(pool, limit).await?;
    if alerts.is_empty() {
        println!("no alerts recorded");
        return Ok(());
    }
    println!("{:<18}{:<8}{:<15}SUMMARY", "GENERATED", "PRIO", "CATEGORY");
    for alert in &alerts {
        println!(
            "{:<18}{:<8}{:<15}{}",
            alert.generated_at.format("%Y-%m-%d %H:%M"),
            alert.priority,
            alert.category,
            alert.summary
        );
    }
    Ok(())
}

pub(crate) async fn run_history(
    pool: &sqlx::PgPool,
    identity: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let canonical = identity.trim().to_lowercase();
    let entity = starwatch_db::get_entity(pool, &canonical)
        .await?
        .ok_or_else(|| anyhow::anyhow!("entity '{canonical}' is not tracked"))?;
    let history = starwatch_db::list_history(pool, &canonical, limit).await?;

    println!("{}  {} stars  {:.2}/day", entity.identity, entity.popularity, entity.growth_rate);
    println!(
        "created {}  first seen {}  last updated {}",
        entity.created_at.format("%Y-%m-%d"),
        entity.first_seen.format("%Y-%m-%d %H:%M"),
        entity.last_updated.format("%Y-%m-%d %H:%M")
    );
    println!();
    if history.is_empty() {
        println!("no earlier observations");
        return Ok(());
    }
    println!("{:<18}{:>9}{:>9}", "OBSERVED", "STARS", "FORKS");
    for record in &history {
        println!(
            "{:<18}{:>9}{:>9}",
            record.observed_at.format("%Y-%m-%d %H:%M"),
            record.popularity,
            record.secondary_count
        );
    }
    Ok(())
}

pub(crate) async fn run_runs_list(pool: &sqlx::PgPool, limit: usize) -> anyhow::Result<()> {
    let runs = starwatch_db::list_watch_runs(pool, limit).await?;
    if runs.is_empty() {
        println!("no watch runs recorded");
        return Ok(());
    }
    println!(
        "{:<7}{:<11}{:<11}{:<18}{:>9}{:>8}{:>8}  ERROR",
        "ID", "TRIGGER", "STATUS", "STARTED", "RECEIVED", "ALERTS", "DROPPED"
    );
    for run in &runs {
        let started = run.started_at.map_or_else(
            || "\u{2014}".to_string(),
            |t| t.format("%Y-%m-%d %H:%M").to_string(),
        );
        println!(
            "{:<7}{:<11}{:<11}{:<18}{:>9}{:>8}{:>8}  {}",
            run.id,
            run.trigger_source,
            run.status,
            started,
            run.received,
            run.alerts_emitted,
            run.candidates_not_emitted,
            run.error_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars.saturating_sub(3)).collect::<String>())
    } else {
        s.to_string()
    }
}
