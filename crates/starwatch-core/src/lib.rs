//! Shared domain types and configuration for starwatch.
//!
//! Everything here is plain data: tracked entities, observations, alerts and
//! the thresholds that drive classification. No I/O beyond reading config.

pub mod app_config;
pub mod config;
pub mod model;
pub mod thresholds;
pub mod watchlist;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, HttpConfig, NotifyConfig};
pub use config::{load_app_config, load_app_config_from_env};
pub use model::{
    Alert, AlertCategory, Category, CategoryCount, Observation, ObservationRecord, Priority,
    RawObservation, TrackedEntity,
};
pub use thresholds::{AlertPolicyConfig, Thresholds};
pub use watchlist::{load_watchlist, parse_watchlist, SearchQuery, WatchlistFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read watchlist file {path}: {source}")]
    WatchlistFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse watchlist file: {0}")]
    WatchlistFileParse(#[source] serde_yaml::Error),

    #[error("watchlist validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid category: {0}")]
    InvalidCategory(String),

    #[error("invalid alert category: {0}")]
    InvalidAlertCategory(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),
}
