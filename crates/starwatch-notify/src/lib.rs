//! Notification dispatch for starwatch alerts.
//!
//! Three channels are supported, each enabled by its configuration:
//!
//! - Telegram (`TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`): an HTML digest
//!   sent through the Bot API `sendMessage` method.
//! - Webhook (`STARWATCH_WEBHOOK_URL`): the alerts POSTed as one JSON document.
//! - File (`STARWATCH_NOTIFY_FILE`): a JSON array of the newest 100 alerts.
//!
//! [`Notifier`] implements [`AlertDispatcher`]; every channel is attempted
//! and reported independently.

pub mod channels;
pub mod error;

use std::time::Duration;

use reqwest::Client;
use starwatch_core::{Alert, HttpConfig, NotifyConfig};
use starwatch_engine::{AlertDispatcher, ChannelOutcome, DeliveryStatus};

pub use channels::file::{FileChannel, FILE_CHANNEL_CAP};
pub use channels::telegram::{format_digest, TelegramChannel, DEFAULT_TELEGRAM_API};
pub use channels::webhook::{WebhookChannel, WebhookPayload};
pub use error::NotifyError;

pub const TELEGRAM: &str = "telegram";
pub const WEBHOOK: &str = "webhook";
pub const FILE: &str = "file";

#[derive(Default)]
pub struct Notifier {
    telegram: Option<TelegramChannel>,
    webhook: Option<WebhookChannel>,
    file: Option<FileChannel>,
}

impl Notifier {
    /// Build the channels enabled by `notify`, sharing one HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn from_config(notify: &NotifyConfig, http: &HttpConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.request_timeout_secs))
            .user_agent(http.user_agent.as_str())
            .build()?;

        let telegram = match (&notify.telegram_bot_token, &notify.telegram_chat_id) {
            (Some(token), Some(chat_id)) => Some(TelegramChannel::new(
                client.clone(),
                token.clone(),
                chat_id.clone(),
            )),
            _ => None,
        };
        let webhook = notify
            .webhook_url
            .as_ref()
            .map(|url| WebhookChannel::new(client.clone(), url.clone()));
        let file = notify.file_path.clone().map(FileChannel::new);

        let notifier = Self {
            telegram,
            webhook,
            file,
        };
        tracing::info!(
            telegram = notifier.telegram.is_some(),
            webhook = notifier.webhook.is_some(),
            file = notifier.file.is_some(),
            "notification channels configured"
        );
        Ok(notifier)
    }

    #[must_use]
    pub fn with_telegram(mut self, channel: TelegramChannel) -> Self {
        self.telegram = Some(channel);
        self
    }

    #[must_use]
    pub fn with_webhook(mut self, channel: WebhookChannel) -> Self {
        self.webhook = Some(channel);
        self
    }

    #[must_use]
    pub fn with_file(mut self, channel: FileChannel) -> Self {
        self.file = Some(channel);
        self
    }

    #[must_use]
    pub fn enabled_channels(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.telegram.is_some() {
            names.push(TELEGRAM);
        }
        if self.webhook.is_some() {
            names.push(WEBHOOK);
        }
        if self.file.is_some() {
            names.push(FILE);
        }
        names
    }
}

fn outcome(channel: &'static str, result: Option<Result<(), NotifyError>>) -> ChannelOutcome {
    let status = match result {
        None => DeliveryStatus::Skipped,
        Some(Ok(())) => DeliveryStatus::Delivered,
        Some(Err(e)) => DeliveryStatus::Failed(e.to_string()),
    };
    ChannelOutcome::new(channel, status)
}

impl AlertDispatcher for Notifier {
    async fn deliver(&self, alerts: &[Alert]) -> Vec<ChannelOutcome> {
        if alerts.is_empty() {
            return [TELEGRAM, WEBHOOK, FILE]
                .into_iter()
                .map(|name| ChannelOutcome::new(name, DeliveryStatus::Skipped))
                .collect();
        }

        let telegram = async {
            match &self.telegram {
                Some(ch) => Some(ch.send(alerts).await),
                None => None,
            }
        };
        let webhook = async {
            match &self.webhook {
                Some(ch) => Some(ch.send(alerts).await),
                None => None,
            }
        };
        let file = async {
            match &self.file {
                Some(ch) => Some(ch.prepend(alerts).await),
                None => None,
            }
        };
        let (telegram, webhook, file) = tokio::join!(telegram, webhook, file);

        vec![
            outcome(TELEGRAM, telegram),
            outcome(WEBHOOK, webhook),
            outcome(FILE, file),
        ]
    }
}
