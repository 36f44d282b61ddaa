//! Snapshot ingest: validate and canonicalize raw observations.

use std::collections::HashMap;

use starwatch_core::{Observation, RawObservation};

use crate::error::IngestRejection;

/// Result of normalizing one batch.
#[derive(Debug, Default)]
pub struct IngestBatch {
    /// Valid observations, one per identity, in first-seen order.
    pub observations: Vec<Observation>,
    pub rejections: Vec<IngestRejection>,
    pub received: usize,
    /// Observations replaced by a later one for the same identity.
    pub duplicates: usize,
}

/// Canonicalize an identity: trim surrounding whitespace and lowercase.
#[must_use]
pub fn canonical_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Validate one raw observation.
///
/// # Errors
///
/// Returns [`IngestRejection`] when the identity is missing or blank, or when
/// either count is negative.
pub fn normalize(raw: RawObservation) -> Result<Observation, IngestRejection> {
    let identity = raw
        .identity
        .as_deref()
        .map(canonical_identity)
        .filter(|id| !id.is_empty())
        .ok_or(IngestRejection::MissingIdentity)?;

    for (field, value) in [
        ("popularity", raw.popularity),
        ("secondary_count", raw.secondary_count),
    ] {
        if value < 0 {
            return Err(IngestRejection::NegativeCount {
                identity,
                field,
                value,
            });
        }
    }

    Ok(Observation {
        identity,
        popularity: raw.popularity,
        secondary_count: raw.secondary_count,
        created_at: raw.created_at,
        url: raw.url,
        description: raw.description,
        language: raw.language,
        source_label: raw.source_label,
        topics: raw.topics,
        relevance: raw.relevance.filter(|r| r.is_finite()),
        metadata: raw.metadata,
    })
}

/// Normalize a batch. Rejected items are counted and skipped; when the same
/// identity appears twice the later observation replaces the earlier one.
#[must_use]
pub fn ingest_batch(raws: Vec<RawObservation>) -> IngestBatch {
    let mut batch = IngestBatch {
        received: raws.len(),
        ..IngestBatch::default()
    };
    let mut positions: HashMap<String, usize> = HashMap::new();

    for raw in raws {
        match normalize(raw) {
            Ok(observation) => {
                if let Some(&idx) = positions.get(&observation.identity) {
                    batch.duplicates += 1;
                    batch.observations[idx] = observation;
                } else {
                    positions.insert(observation.identity.clone(), batch.observations.len());
                    batch.observations.push(observation);
                }
            }
            Err(rejection) => {
                tracing::warn!(reason = %rejection, "rejected observation");
                batch.rejections.push(rejection);
            }
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(identity: Option<&str>, popularity: i64) -> RawObservation {
        RawObservation {
            identity: identity.map(str::to_string),
            popularity,
            ..RawObservation::default()
        }
    }

    #[test]
    fn identity_is_trimmed_and_lowercased() {
        let obs = normalize(raw(Some("  Anthropics/Claude-Code \n"), 5)).unwrap();
        assert_eq!(obs.identity, "anthropics/claude-code");
    }

    #[test]
    fn empty_identity_is_rejected() {
        assert_eq!(
            normalize(raw(Some(""), 10)),
            Err(IngestRejection::MissingIdentity)
        );
        assert_eq!(
            normalize(raw(Some("   "), 10)),
            Err(IngestRejection::MissingIdentity)
        );
        assert_eq!(normalize(raw(None, 10)), Err(IngestRejection::MissingIdentity));
    }

    #[test]
    fn negative_counts_are_rejected() {
        let err = normalize(raw(Some("a/b"), -1)).unwrap_err();
        assert!(matches!(
            err,
            IngestRejection::NegativeCount { field: "popularity", value: -1, .. }
        ));

        let mut forks = raw(Some("a/b"), 3);
        forks.secondary_count = -4;
        let err = normalize(forks).unwrap_err();
        assert!(matches!(
            err,
            IngestRejection::NegativeCount { field: "secondary_count", .. }
        ));
    }

    #[test]
    fn non_finite_relevance_is_dropped() {
        let mut r = raw(Some("a/b"), 1);
        r.relevance = Some(f64::NAN);
        assert!(normalize(r).unwrap().relevance.is_none());
    }

    #[test]
    fn batch_counts_rejections_and_continues() {
        let batch = ingest_batch(vec![
            raw(Some("a/one"), 1),
            raw(Some(""), 10),
            raw(Some("a/two"), -3),
            raw(Some("a/three"), 7),
        ]);
        assert_eq!(batch.received, 4);
        assert_eq!(batch.rejections.len(), 2);
        let ids: Vec<_> = batch.observations.iter().map(|o| o.identity.as_str()).collect();
        assert_eq!(ids, ["a/one", "a/three"]);
    }

    #[test]
    fn later_duplicate_wins_in_first_position() {
        let batch = ingest_batch(vec![
            raw(Some("a/one"), 1),
            raw(Some("a/two"), 2),
            raw(Some("A/One "), 9),
        ]);
        assert_eq!(batch.duplicates, 1);
        assert_eq!(batch.observations.len(), 2);
        assert_eq!(batch.observations[0].identity, "a/one");
        assert_eq!(batch.observations[0].popularity, 9);
        assert_eq!(batch.observations[1].identity, "a/two");
    }
}
