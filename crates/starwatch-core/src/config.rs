use std::str::FromStr;

use crate::app_config::{AppConfig, Environment, HttpConfig, NotifyConfig};
use crate::thresholds::{AlertPolicyConfig, Thresholds};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
#[allow(clippy::too_many_lines)]
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        parse_value::<SocketAddr>(var, &or_default(var, default))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("STARWATCH_ENV", "development"))?;

    let bind_addr = parse("STARWATCH_BIND_ADDR", "0.0.0.0:3458")?;
    let log_level = or_default("STARWATCH_LOG_LEVEL", "info");
    let watchlist_path = PathBuf::from(or_default(
        "STARWATCH_WATCHLIST_PATH",
        "./config/watchlist.yaml",
    ));

    let db_max_connections = parse_value(
        "STARWATCH_DB_MAX_CONNECTIONS",
        &or_default("STARWATCH_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections = parse_value(
        "STARWATCH_DB_MIN_CONNECTIONS",
        &or_default("STARWATCH_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs = parse_value(
        "STARWATCH_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("STARWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let defaults = Thresholds::default();
    let thresholds = Thresholds {
        max_age_rising_days: parse_or(
            &lookup,
            "STARWATCH_MAX_AGE_RISING_DAYS",
            defaults.max_age_rising_days,
        )?,
        min_stars_rising: parse_or(
            &lookup,
            "STARWATCH_MIN_STARS_RISING",
            defaults.min_stars_rising,
        )?,
        min_stars_per_day_rising: parse_or(
            &lookup,
            "STARWATCH_MIN_STARS_PER_DAY_RISING",
            defaults.min_stars_per_day_rising,
        )?,
        min_stars_established: parse_or(
            &lookup,
            "STARWATCH_MIN_STARS_ESTABLISHED",
            defaults.min_stars_established,
        )?,
    };
    validate_thresholds(&thresholds)?;

    let policy_defaults = AlertPolicyConfig::default();
    let priority_keywords = match optional("STARWATCH_PRIORITY_KEYWORDS") {
        Some(raw) => parse_keyword_list(&raw),
        None => policy_defaults.priority_keywords.clone(),
    };
    let alert_policy = AlertPolicyConfig {
        significant_growth_margin: parse_or(
            &lookup,
            "STARWATCH_SIGNIFICANT_GROWTH_MARGIN",
            policy_defaults.significant_growth_margin,
        )?,
        high_growth_per_day: parse_or(
            &lookup,
            "STARWATCH_HIGH_GROWTH_PER_DAY",
            policy_defaults.high_growth_per_day,
        )?,
        min_relevance: parse_or(
            &lookup,
            "STARWATCH_MIN_RELEVANCE",
            policy_defaults.min_relevance,
        )?,
        max_alerts_per_run: parse_or(
            &lookup,
            "STARWATCH_MAX_ALERTS_PER_RUN",
            policy_defaults.max_alerts_per_run,
        )?,
        priority_keywords,
    };
    validate_alert_policy(&alert_policy)?;

    let alert_log_cap: usize = parse_or(&lookup, "STARWATCH_ALERT_LOG_CAP", 100)?;

    let http = HttpConfig {
        request_timeout_secs: parse_or(&lookup, "STARWATCH_HTTP_TIMEOUT_SECS", 15)?,
        user_agent: or_default(
            "STARWATCH_HTTP_USER_AGENT",
            "starwatch/0.1 (repo-growth-tracker)",
        ),
        max_retries: parse_or(&lookup, "STARWATCH_HTTP_MAX_RETRIES", 3)?,
        retry_backoff_base_secs: parse_or(&lookup, "STARWATCH_HTTP_RETRY_BACKOFF_BASE_SECS", 2)?,
    };

    let notify = NotifyConfig {
        telegram_bot_token: optional("TELEGRAM_BOT_TOKEN"),
        telegram_chat_id: optional("TELEGRAM_CHAT_ID"),
        webhook_url: optional("STARWATCH_WEBHOOK_URL"),
        file_path: optional("STARWATCH_NOTIFY_FILE").map(PathBuf::from),
    };

    let watch_cron = or_default("STARWATCH_WATCH_CRON", "0 0 */6 * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        watchlist_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        thresholds,
        alert_policy,
        alert_log_cap,
        github_token: optional("GITHUB_TOKEN"),
        http,
        notify,
        watch_cron,
    })
}

fn parse_value<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

fn parse_or<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Ok(raw) => parse_value(var, &raw),
        Err(_) => Ok(default),
    }
}

/// Split a comma-separated keyword list, lowercasing and dropping blanks.
fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

fn validate_thresholds(thresholds: &Thresholds) -> Result<(), ConfigError> {
    if thresholds.max_age_rising_days < 1 {
        return Err(ConfigError::InvalidEnvVar {
            var: "STARWATCH_MAX_AGE_RISING_DAYS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if thresholds.min_stars_rising < 0 || thresholds.min_stars_established < 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "STARWATCH_MIN_STARS_RISING/STARWATCH_MIN_STARS_ESTABLISHED".to_string(),
            reason: "star thresholds must be non-negative".to_string(),
        });
    }
    if !thresholds.min_stars_per_day_rising.is_finite() || thresholds.min_stars_per_day_rising < 0.0
    {
        return Err(ConfigError::InvalidEnvVar {
            var: "STARWATCH_MIN_STARS_PER_DAY_RISING".to_string(),
            reason: "must be a non-negative number".to_string(),
        });
    }
    Ok(())
}

fn validate_alert_policy(policy: &AlertPolicyConfig) -> Result<(), ConfigError> {
    let checks = [
        (
            "STARWATCH_SIGNIFICANT_GROWTH_MARGIN",
            policy.significant_growth_margin,
        ),
        ("STARWATCH_HIGH_GROWTH_PER_DAY", policy.high_growth_per_day),
        ("STARWATCH_MIN_RELEVANCE", policy.min_relevance),
    ];
    for (var, value) in checks {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }
    }
    if policy.max_alerts_per_run == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "STARWATCH_MAX_ALERTS_PER_RUN".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "STARWATCH_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
