// Best-effort notification channel
pub mod messages;
pub mod telegram;

pub use telegram::TelegramNotifier;

use crate::config::TelegramConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Fire-and-forget message sink
///
/// Implementations log their own failures and report them through the
/// return value; trading logic never waits on or reacts to a failed send.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> bool;

    fn name(&self) -> &'static str;
}

/// Writes notifications to the log when no chat channel is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> bool {
        tracing::info!("📣 {}", message.replace('\n', " | "));
        true
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Telegram when credentials are configured, the log otherwise
pub fn from_config(config: &TelegramConfig) -> Arc<dyn Notifier> {
    match config.credentials() {
        Some((token, chat_id)) => Arc::new(TelegramNotifier::new(token, chat_id)),
        None => {
            tracing::info!("No Telegram credentials configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    }
}
