use std::collections::BTreeMap;

use starwatch_core::{RawObservation, SearchQuery};

use crate::types::GithubRepo;

/// Descriptions longer than this are cut at a character boundary.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Map one search hit to a raw observation labelled with the query's topic.
///
/// Only the repository's own fields land in the observation. The query text
/// that found it is provenance, carried as `source_label`, and stays out of
/// `metadata` so it never counts toward keyword priority.
#[must_use]
pub fn repo_to_observation(repo: GithubRepo, query: &SearchQuery) -> RawObservation {
    let description = repo
        .description
        .map(|d| d.trim().chars().take(MAX_DESCRIPTION_CHARS).collect::<String>())
        .filter(|d| !d.is_empty());

    RawObservation {
        identity: Some(repo.full_name),
        popularity: repo.stargazers_count,
        secondary_count: repo.forks_count,
        created_at: Some(repo.created_at),
        url: Some(repo.html_url),
        description,
        language: repo.language,
        source_label: Some(query.label.clone()),
        topics: repo.topics,
        relevance: None,
        metadata: BTreeMap::new(),
    }
}
