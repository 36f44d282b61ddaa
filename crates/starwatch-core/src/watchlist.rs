use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_per_page() -> u32 {
    30
}

/// One repository search the GitHub source runs every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text search terms, as typed into the GitHub search box.
    pub q: String,
    /// Topic label attached to every repository this query finds.
    pub label: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistFile {
    pub queries: Vec<SearchQuery>,
}

/// Load and validate the watchlist from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_watchlist(path: &Path) -> Result<WatchlistFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::WatchlistFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_watchlist(&content)
}

/// Parse and validate watchlist YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_watchlist(content: &str) -> Result<WatchlistFile, ConfigError> {
    let watchlist: WatchlistFile =
        serde_yaml::from_str(content).map_err(ConfigError::WatchlistFileParse)?;

    validate_watchlist(&watchlist)?;

    Ok(watchlist)
}

fn validate_watchlist(watchlist: &WatchlistFile) -> Result<(), ConfigError> {
    if watchlist.queries.is_empty() {
        return Err(ConfigError::Validation(
            "watchlist must contain at least one query".to_string(),
        ));
    }

    let mut seen = HashSet::new();

    for query in &watchlist.queries {
        if query.q.trim().is_empty() {
            return Err(ConfigError::Validation(
                "query text must be non-empty".to_string(),
            ));
        }

        if query.label.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "query '{}' has an empty label",
                query.q
            )));
        }

        // GitHub caps search pages at 100 results.
        if !(1..=100).contains(&query.per_page) {
            return Err(ConfigError::Validation(format!(
                "query '{}' has invalid per_page {}; must be 1-100",
                query.q, query.per_page
            )));
        }

        let normalized = query.q.trim().to_lowercase();
        if !seen.insert(normalized) {
            return Err(ConfigError::Validation(format!(
                "duplicate query: '{}'",
                query.q
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "watchlist_test.rs"]
mod tests;
