//! Exponential backoff for transient GitHub API failures.

use std::future::Future;
use std::time::Duration;

use crate::error::GithubError;

/// Longest wait honoured from a `Retry-After` header.
const MAX_RETRY_AFTER_SECS: u64 = 120;

/// Retriable: rate limiting, network-level failures and 5xx responses.
/// Everything else (bad query, malformed body) fails the same way on retry.
fn is_retriable(err: &GithubError) -> bool {
    match err {
        GithubError::RateLimited { .. } | GithubError::Http(_) => true,
        GithubError::UnexpectedStatus { status, .. } => *status >= 500,
        GithubError::Deserialize { .. }
        | GithubError::InvalidBaseUrl { .. }
        | GithubError::AllQueriesFailed { .. } => false,
    }
}

/// Executes `operation`, retrying transient errors up to `max_retries` more
/// times. The wait before retry `n` is `backoff_base_secs * 2^(n-1)`, or the
/// server's `Retry-After` when that is longer.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_secs: u64,
    mut operation: F,
) -> Result<T, GithubError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GithubError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_retriable(&err) || attempt >= max_retries {
            return Err(err);
        }

        let mut delay_secs = backoff_base_secs.saturating_mul(1u64 << attempt.min(62));
        if let GithubError::RateLimited {
            retry_after_secs: Some(after),
        } = err
        {
            delay_secs = delay_secs.max(after.min(MAX_RETRY_AFTER_SECS));
        }

        tracing::warn!(
            attempt,
            max_retries,
            delay_secs,
            error = %err,
            "transient GitHub error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        attempt += 1;
    }
}
