use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use starwatch_core::Alert;

use crate::error::NotifyError;

/// JSON body posted to the webhook.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub event: &'static str,
    pub sent_at: DateTime<Utc>,
    pub count: usize,
    pub alerts: &'a [Alert],
}

pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    #[must_use]
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }

    /// POST all alerts in one JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] on transport failure and
    /// [`NotifyError::UnexpectedStatus`] on a non-2xx response.
    pub async fn send(&self, alerts: &[Alert]) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            event: "starwatch.alerts",
            sent_at: Utc::now(),
            count: alerts.len(),
            alerts,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::UnexpectedStatus {
                channel: "webhook",
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
