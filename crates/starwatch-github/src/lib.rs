//! GitHub repository search source for starwatch.
//!
//! Runs the watchlist's search queries against the GitHub REST API and maps
//! every repository found to a [`starwatch_core::RawObservation`].

pub mod client;
pub mod error;
pub mod normalize;
pub mod types;

mod retry;

pub use client::{GithubClient, WatchlistFetch, DEFAULT_API_BASE};
pub use error::GithubError;
pub use normalize::{repo_to_observation, MAX_DESCRIPTION_CHARS};
pub use types::{GithubRepo, SearchResponse};
