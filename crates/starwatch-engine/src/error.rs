use chrono::{DateTime, Utc};
use thiserror::Error;

/// Why a raw observation was dropped at ingest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestRejection {
    #[error("observation has no identity")]
    MissingIdentity,

    #[error("observation for {identity} has negative {field}: {value}")]
    NegativeCount {
        identity: String,
        field: &'static str,
        value: i64,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassificationError {
    #[error("{identity} has created_at {created_at} later than now ({now})")]
    CreatedInFuture {
        identity: String,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or a write did not commit.
    #[error("entity store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Stored data for one entity is unusable. Scoped to that entity.
    #[error("corrupt record for {identity}: {reason}")]
    Corrupt { identity: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid priority keyword pattern: {0}")]
    KeywordPattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("watch cycle aborted: {0}")]
    StoreUnavailable(#[source] StoreError),
}
