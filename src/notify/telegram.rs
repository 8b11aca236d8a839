//! Telegram Bot API delivery.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use std::time::Duration;

use super::Notifier;
use crate::monitor::config::TelegramConfig;
use crate::wms::IncidentInfo;

/// Characters that must be backslash-escaped in MarkdownV2 text.
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    '\\',
];

/// Escapes free text for a MarkdownV2 message.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Builds the alert message for an incident.
pub fn format_alert(info: &IncidentInfo) -> String {
    format!(
        "*🔥 Aviso de incendio 🚒*\n\
         \n\
         *{}*\n\
         \n\
         \\- Ciudad: {}\n\
         \\- Dirección: {}\n\
         \\- Llamadas relacionadas: {}\n",
        escape_markdown_v2(&info.description),
        escape_markdown_v2(&info.city),
        escape_markdown_v2(&info.address),
        info.calls
    )
}

/// Sends alerts to one chat through a bot.
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Returns `None` when no bot token or chat id is configured.
    pub fn from_config(config: &TelegramConfig) -> Result<Option<Self>> {
        let Some((token, chat_id)) = config.credentials() else {
            return Ok(None);
        };
        Self::with_credentials(config, token, chat_id).map(Some)
    }

    /// Builds a notifier for explicit credentials, ignoring the environment.
    pub fn with_credentials(
        config: &TelegramConfig,
        token: String,
        chat_id: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
            chat_id,
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, info: &IncidentInfo) -> Result<()> {
        let text = format_alert(info);
        let params = [
            ("chat_id", self.chat_id.as_str()),
            ("text", text.as_str()),
            ("parse_mode", "MarkdownV2"),
        ];

        let response = self
            .client
            .post(self.send_message_url())
            .form(&params)
            .send()
            .context("Telegram request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("Failed to send message: HTTP {}: {}", status, body));
        }

        log::info!("Incident {} sent to Telegram", info.case_folder_id);
        Ok(())
    }
}
