use std::collections::HashSet;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use starwatch_core::{AppConfig, RawObservation, SearchQuery};

use crate::error::GithubError;
use crate::normalize::repo_to_observation;
use crate::retry::retry_with_backoff;
use crate::types::{GithubRepo, SearchResponse};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Observations gathered from one pass over the watchlist.
#[derive(Debug, Default)]
pub struct WatchlistFetch {
    /// One observation per repository, in the order first found.
    pub observations: Vec<RawObservation>,
    /// Queries that failed after retries and were skipped.
    pub failed_queries: usize,
}

/// HTTP client for the GitHub repository search endpoint.
///
/// Rate limiting (429, or 403 with `x-ratelimit-remaining: 0`) and network
/// failures are retried with exponential backoff up to `max_retries` more
/// attempts.
pub struct GithubClient {
    client: Client,
    base_url: String,
    max_retries: u32,
    backoff_base_secs: u64,
}

impl GithubClient {
    /// Creates a client with the configured timeout, `User-Agent`, optional
    /// token and retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`GithubError::InvalidBaseUrl`] if the token
    /// is not a valid header value.
    pub fn new(
        timeout_secs: u64,
        user_agent: &str,
        token: Option<&str>,
        max_retries: u32,
        backoff_base_secs: u64,
    ) -> Result<Self, GithubError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                GithubError::InvalidBaseUrl {
                    url: DEFAULT_API_BASE.to_string(),
                    reason: format!("invalid token header: {e}"),
                }
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_API_BASE.to_string(),
            max_retries,
            backoff_base_secs,
        })
    }

    /// Build a client from the `http` section and token of the app config.
    ///
    /// # Errors
    ///
    /// Same as [`GithubClient::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, GithubError> {
        Self::new(
            config.http.request_timeout_secs,
            &config.http.user_agent,
            config.github_token.as_deref(),
            config.http.max_retries,
            config.http.retry_backoff_base_secs,
        )
    }

    /// Point the client at another API root (GitHub Enterprise, test servers).
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, GithubError> {
        reqwest::Url::parse(base_url).map_err(|e| GithubError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Runs one repository search sorted by stars, with retry on transient errors.
    ///
    /// # Errors
    ///
    /// - [`GithubError::RateLimited`]: rate limit still in force after all retries.
    /// - [`GithubError::UnexpectedStatus`]: any other non-2xx status.
    /// - [`GithubError::Http`]: network or TLS failure after all retries.
    /// - [`GithubError::Deserialize`]: body does not match the search response shape.
    pub async fn search_repositories(
        &self,
        query: &SearchQuery,
    ) -> Result<Vec<GithubRepo>, GithubError> {
        let url = format!("{}/search/repositories", self.base_url);
        let per_page = query.per_page.to_string();

        retry_with_backoff(self.max_retries, self.backoff_base_secs, || {
            let url = url.clone();
            let per_page = per_page.clone();
            async move {
                let response = self
                    .client
                    .get(&url)
                    .query(&[
                        ("q", query.q.as_str()),
                        ("sort", "stars"),
                        ("order", "desc"),
                        ("per_page", per_page.as_str()),
                    ])
                    .send()
                    .await?;
                let status = response.status();

                if is_rate_limited(status, response.headers()) {
                    let retry_after_secs = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok());
                    return Err(GithubError::RateLimited { retry_after_secs });
                }

                if !status.is_success() {
                    return Err(GithubError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    });
                }

                let body = response.text().await?;
                let parsed = serde_json::from_str::<SearchResponse>(&body).map_err(|e| {
                    GithubError::Deserialize {
                        context: format!("search results for '{}'", query.q),
                        source: e,
                    }
                })?;

                if parsed.incomplete_results {
                    tracing::debug!(query = %query.q, "GitHub returned incomplete search results");
                }

                Ok(parsed.items)
            }
        })
        .await
    }

    /// Run every watchlist query and map the results to observations.
    ///
    /// A repository found by several queries is kept once, labelled by the
    /// first query that found it. A query that fails after retries is logged
    /// and skipped.
    pub async fn fetch_watchlist(&self, queries: &[SearchQuery]) -> WatchlistFetch {
        let mut fetch = WatchlistFetch::default();
        let mut seen: HashSet<String> = HashSet::new();

        for query in queries {
            match self.search_repositories(query).await {
                Ok(repos) => {
                    let found = repos.len();
                    for repo in repos {
                        if seen.insert(repo.full_name.to_lowercase()) {
                            fetch.observations.push(repo_to_observation(repo, query));
                        }
                    }
                    tracing::info!(query = %query.q, label = %query.label, found, "GitHub search complete");
                }
                Err(e) => {
                    fetch.failed_queries += 1;
                    tracing::warn!(query = %query.q, error = %e, "GitHub search failed, skipping query");
                }
            }
        }

        fetch
    }

    /// [`GithubClient::fetch_watchlist`], failing only when no query succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`GithubError::AllQueriesFailed`] if every query failed.
    pub async fn fetch_observations(
        &self,
        queries: &[SearchQuery],
    ) -> Result<Vec<RawObservation>, GithubError> {
        let fetch = self.fetch_watchlist(queries).await;

        if fetch.failed_queries > 0 && fetch.failed_queries == queries.len() {
            return Err(GithubError::AllQueriesFailed {
                failed: fetch.failed_queries,
            });
        }
        if fetch.failed_queries > 0 {
            tracing::warn!(
                failed_queries = fetch.failed_queries,
                total_queries = queries.len(),
                "some watchlist queries failed"
            );
        }
        Ok(fetch.observations)
    }
}

fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0")
}
