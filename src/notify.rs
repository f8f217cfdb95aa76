//! Telegram notification delivery.
//!
//! [`TelegramNotifier`] sends the run's outcome as one plain-text message
//! via the Telegram Bot API. Delivery is a single attempt; a failure is
//! logged by the caller and never affects the run's verdict or exit.

use std::time::Duration;

use crate::config::TelegramSection;

/// HTTP request timeout for the single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Telegram Bot API root.
const API_BASE: &str = "https://api.telegram.org";

/// Error type for notification delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Telegram answered with a non-2xx status code.
    #[error("Telegram returned HTTP {0}")]
    Status(u16),
}

/// Delivers alert messages to a Telegram chat.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Create a notifier with a pre-configured HTTP client.
    pub fn new(telegram: &TelegramSection) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");

        Self {
            client,
            bot_token: telegram.bot_token.clone(),
            chat_id: telegram.chat_id.clone(),
        }
    }

    /// Send one plain-text message to the configured chat.
    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{API_BASE}/bot{}/sendMessage", self.bot_token);
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status(response.status().as_u16()));
        }

        tracing::debug!("Telegram notification delivered");
        Ok(())
    }
}
