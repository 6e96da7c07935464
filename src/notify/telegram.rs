use super::Notifier;
use crate::error::TradingError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends notifications through the Telegram Bot API
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    base_url: String,
    client: reqwest::Client,
}

/// Payload for `sendMessage`
#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self::with_base_url(bot_token, chat_id, TELEGRAM_API.to_string())
    }

    /// Point the notifier at a different API host (used by tests)
    pub fn with_base_url(bot_token: String, chat_id: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            bot_token,
            chat_id,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn send(&self, text: &str) -> Result<(), TradingError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let payload = TelegramMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TradingError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TradingError::Notification(format!(
                "Telegram API error {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> bool {
        match self.send(message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠️  Notification not delivered: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
