use crate::common::{AttendanceError, Result};
use crate::common::config::NotifyConfig;
use crate::notify::Notifier;
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API client for `sendMessage`.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token),
        })
    }

    /// `None` when no bot token is configured.
    pub fn from_config(config: &NotifyConfig) -> Result<Option<Self>> {
        match config.telegram_bot_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(Some(Self::new(&config.telegram_api_base, token)?)),
            _ => Ok(None),
        }
    }
}

impl Notifier for TelegramNotifier {
    fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage { chat_id, text })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let detail = if body.is_empty() { status.to_string() } else { body };
            return Err(AttendanceError::Notify(format!("Telegram send failed: {}", detail)));
        }

        tracing::debug!("Sent Telegram message to {}", chat_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[test]
    fn posts_chat_and_text_as_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/botTOKEN/sendMessage")
                .json_body(json!({ "chat_id": "42", "text": "hello" }));
            then.status(200).json_body(json!({ "ok": true }));
        });

        let notifier = TelegramNotifier::new(&server.base_url(), "TOKEN").unwrap();
        notifier.send("42", "hello").unwrap();
        mock.assert();
    }

    #[test]
    fn error_status_carries_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/botTOKEN/sendMessage");
            then.status(400).body("chat not found");
        });

        let notifier = TelegramNotifier::new(&format!("{}/", server.base_url()), "TOKEN").unwrap();
        let err = notifier.send("1", "x").unwrap_err();
        assert!(matches!(err, AttendanceError::Notify(msg) if msg.contains("chat not found")));
    }

    #[test]
    fn blank_token_means_no_notifier() {
        let config = NotifyConfig { telegram_bot_token: Some("  ".into()), ..NotifyConfig::default() };
        assert!(TelegramNotifier::from_config(&config).unwrap().is_none());
    }
}
