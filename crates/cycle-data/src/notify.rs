//! Outbound notifications.

use reqwest::Client;
use std::time::Duration;

use crate::source::Notifier;

/// Telegram Bot API base URL.
const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Pushes messages to a Telegram chat through the Bot API.
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Creates a notifier for `chat_id` using `bot_token`.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::with_base_url(TELEGRAM_API_URL, bot_token, chat_id)
    }

    /// Same as [`TelegramNotifier::new`] against another Bot API endpoint.
    pub fn with_base_url(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.bot_token)
    }
}

impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": message,
        });

        let result = self
            .client
            .post(self.send_message_url())
            .timeout(Duration::from_secs(5))
            .json(&payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        if let Err(e) = result {
            // never log the URL, it embeds the bot token
            tracing::warn!(error = %e.without_url(), "telegram notification failed");
        }
    }
}

/// Notifier used when no messaging credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    async fn notify(&self, message: &str) {
        tracing::debug!(message, "notifications disabled, dropping message");
    }
}

/// Either notifier, chosen at startup from the environment.
pub enum AnyNotifier {
    /// Telegram delivery.
    Telegram(TelegramNotifier),
    /// Delivery disabled.
    Disabled(NoopNotifier),
}

impl AnyNotifier {
    /// Builds a Telegram notifier when both credentials are present.
    pub fn from_credentials(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        match (bot_token, chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                AnyNotifier::Telegram(TelegramNotifier::new(token, chat))
            }
            _ => AnyNotifier::Disabled(NoopNotifier),
        }
    }

    /// Whether messages will actually be delivered.
    pub fn is_enabled(&self) -> bool {
        matches!(self, AnyNotifier::Telegram(_))
    }
}

impl Notifier for AnyNotifier {
    async fn notify(&self, message: &str) {
        match self {
            AnyNotifier::Telegram(inner) => inner.notify(message).await,
            AnyNotifier::Disabled(inner) => inner.notify(message).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_send_message_url() {
        let notifier = TelegramNotifier::new("123:abc", "42");
        assert_eq!(
            notifier.send_message_url(),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn base_url_is_configurable() {
        let notifier = TelegramNotifier::with_base_url("http://localhost:8081/", "t", "42");
        assert_eq!(
            notifier.send_message_url(),
            "http://localhost:8081/bott/sendMessage"
        );
    }

    #[tokio::test]
    async fn failed_delivery_is_swallowed() {
        // port 9 on loopback refuses the connection
        let notifier = TelegramNotifier::with_base_url("http://127.0.0.1:9", "123:abc", "42");
        notifier.notify("wallet done").await;

        let wrapped = AnyNotifier::Telegram(notifier);
        assert!(wrapped.is_enabled());
        wrapped.notify("wallet done again").await;
    }

    #[test]
    fn requires_both_credentials() {
        assert!(AnyNotifier::from_credentials(Some("t".into()), Some("c".into())).is_enabled());
        assert!(!AnyNotifier::from_credentials(Some("t".into()), None).is_enabled());
        assert!(!AnyNotifier::from_credentials(None, Some("c".into())).is_enabled());
        assert!(!AnyNotifier::from_credentials(Some(String::new()), Some("c".into())).is_enabled());
    }

    #[tokio::test]
    async fn noop_notifier_swallows_messages() {
        AnyNotifier::from_credentials(None, None)
            .notify("wallet done")
            .await;
    }
}
