//! Growth-tracking and alerting engine for starwatch.
//!
//! Feeds batches of raw observations through ingest, the entity store, the
//! growth classifier, the change detector and the alert policy. Fetching and
//! notification delivery live outside this crate; the store and dispatcher
//! are reached through the [`EntityStore`] and [`AlertDispatcher`] traits.

pub mod classifier;
pub mod detector;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod policy;
pub mod store;

pub use classifier::{classify, round2, Classification, ClassifierInput};
pub use detector::{detect, ChangeDelta, ChangeReason, DetectorInput};
pub use dispatch::{dispatch_alerts, AlertDispatcher, ChannelOutcome, DeliveryStatus};
pub use error::{ClassificationError, IngestRejection, PolicyError, RunError, StoreError};
pub use ingest::{ingest_batch, normalize, IngestBatch};
pub use pipeline::{run_cycle, CycleConfig, RunSummary};
pub use policy::{AlertCandidate, AlertPolicy, PolicyOutcome};
pub use store::{EntityStore, MemoryStore, UpsertOutcome};
