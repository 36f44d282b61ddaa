//! Telegram Bot API channel: one HTML digest message per run.

use reqwest::Client;
use serde::Serialize;
use starwatch_core::{Alert, AlertCategory};

use crate::error::NotifyError;

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Entries listed per section before the rest are summarised as a count.
const MAX_PER_SECTION: usize = 5;

pub struct TelegramChannel {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

impl TelegramChannel {
    #[must_use]
    pub fn new(client: Client, bot_token: String, chat_id: String) -> Self {
        Self {
            client,
            api_base: DEFAULT_TELEGRAM_API.to_string(),
            bot_token,
            chat_id,
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Send the digest for `alerts` via `sendMessage`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] on transport failure and
    /// [`NotifyError::UnexpectedStatus`] when Telegram answers non-2xx.
    pub async fn send(&self, alerts: &[Alert]) -> Result<(), NotifyError> {
        let text = format_digest(alerts);
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: &text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::UnexpectedStatus {
                channel: "telegram",
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Render alerts as a Telegram HTML message grouped by alert category.
#[must_use]
pub fn format_digest(alerts: &[Alert]) -> String {
    let mut msg = String::from("<b>starwatch: new findings</b>\n");

    for (category, heading) in [
        (AlertCategory::Rising, "Rising stars"),
        (AlertCategory::HighValue, "High-value projects"),
        (AlertCategory::Informational, "Watched topics"),
    ] {
        let section: Vec<&Alert> = alerts.iter().filter(|a| a.category == category).collect();
        if section.is_empty() {
            continue;
        }
        msg.push_str(&format!("\n<b>{heading}</b>\n"));
        for alert in section.iter().take(MAX_PER_SECTION) {
            msg.push_str(&digest_line(alert));
            msg.push('\n');
        }
        if section.len() > MAX_PER_SECTION {
            msg.push_str(&format!("… and {} more\n", section.len() - MAX_PER_SECTION));
        }
    }

    if let Some(first) = alerts.first() {
        msg.push('\n');
        msg.push_str(&first.generated_at.format("%Y-%m-%d %H:%M UTC").to_string());
    }
    msg
}

fn digest_line(alert: &Alert) -> String {
    let name = escape_html(&alert.entity_identity);
    let link = match &alert.url {
        Some(url) => format!("<a href=\"{}\">{name}</a>", escape_html(url)),
        None => name,
    };
    format!(
        "• {link} ⭐{} ({:.2}/day)",
        alert.popularity, alert.growth_rate
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
