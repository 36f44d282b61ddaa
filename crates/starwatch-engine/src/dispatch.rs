//! Notification dispatch seam.

use std::fmt;
use std::future::Future;

use serde::Serialize;
use starwatch_core::Alert;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
    /// Channel not configured, or nothing to send.
    Skipped,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Delivered => f.write_str("delivered"),
            DeliveryStatus::Failed(reason) => write!(f, "failed: {reason}"),
            DeliveryStatus::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

impl ChannelOutcome {
    #[must_use]
    pub fn new(channel: impl Into<String>, status: DeliveryStatus) -> Self {
        Self {
            channel: channel.into(),
            status,
        }
    }
}

/// Delivers a run's alerts. Each channel is attempted independently; a
/// failing channel is reported in its outcome, never as an error.
pub trait AlertDispatcher: Send + Sync {
    fn deliver(&self, alerts: &[Alert]) -> impl Future<Output = Vec<ChannelOutcome>> + Send;
}

/// Deliver alerts and log every channel outcome.
pub async fn dispatch_alerts<D: AlertDispatcher>(
    dispatcher: &D,
    alerts: &[Alert],
) -> Vec<ChannelOutcome> {
    let outcomes = dispatcher.deliver(alerts).await;

    for outcome in &outcomes {
        match &outcome.status {
            DeliveryStatus::Failed(reason) => tracing::warn!(
                channel = %outcome.channel,
                alerts = alerts.len(),
                error = %reason,
                "alert delivery failed"
            ),
            status => tracing::info!(
                channel = %outcome.channel,
                alerts = alerts.len(),
                status = %status,
                "alert delivery finished"
            ),
        }
    }

    outcomes
}
