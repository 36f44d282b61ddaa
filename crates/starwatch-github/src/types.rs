use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Body of `GET /search/repositories`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<GithubRepo>,
}

/// The subset of a repository search item starwatch reads.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRepo {
    pub full_name: String,
    pub html_url: String,
    pub description: Option<String>,
    pub stargazers_count: i64,
    pub forks_count: i64,
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub topics: Vec<String>,
}
