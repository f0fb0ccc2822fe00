//! Telegram Bot API notifier

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::{NotifyError, Result};
use crate::notifier::{MessageHandle, Notifier};

/// Public Bot API endpoint
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Bot API settings
#[derive(Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub api_url: String,
    pub request_timeout: Duration,
}

impl TelegramConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Point at a different Bot API server
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: &'a str,
    message_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<Option<T>> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(NotifyError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Editing to identical text is reported as an error by the Bot API
fn is_not_modified(err: &NotifyError) -> bool {
    matches!(err, NotifyError::Api { description, .. } if description.contains("message is not modified"))
}

/// [`Notifier`] posting through a Telegram bot
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.config.api_url, self.config.token, method)
    }

    async fn call<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<Option<T>> {
        // Error statuses still carry a JSON body with the description
        let response: ApiResponse<T> = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        response.into_result()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, recipient: &str, text: &str) -> Result<MessageHandle> {
        let sent: Option<SentMessage> = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id: recipient,
                    text,
                },
            )
            .await?;
        let sent = sent.ok_or_else(|| NotifyError::Api {
            code: 0,
            description: "sendMessage returned no message".to_string(),
        })?;
        debug!(chat_id = recipient, message_id = sent.message_id, "Message sent");
        Ok(MessageHandle {
            recipient: recipient.to_string(),
            message_id: sent.message_id,
        })
    }

    async fn edit_message(&self, handle: &MessageHandle, text: &str) -> Result<()> {
        let result = self
            .call::<_, serde_json::Value>(
                "editMessageText",
                &EditMessageText {
                    chat_id: &handle.recipient,
                    message_id: handle.message_id,
                    text,
                },
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_not_modified(&err) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_url() {
        let notifier = TelegramNotifier::new(
            TelegramConfig::new("123:abc").with_api_url("http://bot-proxy:8081/"),
        )
        .unwrap();
        assert_eq!(
            notifier.method_url("sendMessage"),
            "http://bot-proxy:8081/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let config = TelegramConfig::new("123:secret-token");
        assert!(!format!("{config:?}").contains("secret-token"));
    }

    #[test]
    fn test_api_response_parsing() {
        let ok: ApiResponse<SentMessage> =
            serde_json::from_str(r#"{"ok": true, "result": {"message_id": 77, "chat": {}}}"#)
                .unwrap();
        assert_eq!(ok.into_result().unwrap().unwrap().message_id, 77);

        let failed: ApiResponse<SentMessage> = serde_json::from_str(
            r#"{"ok": false, "error_code": 400, "description": "Bad Request: message is not modified"}"#,
        )
        .unwrap();
        let err = failed.into_result().unwrap_err();
        assert!(is_not_modified(&err));
    }

    #[tokio::test]
    async fn test_request_error_hides_token() {
        let notifier = TelegramNotifier::new(
            TelegramConfig::new("123:secret-token").with_api_url("http://127.0.0.1:1"),
        )
        .unwrap();

        let err = notifier.send_message("-100", "hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Request(_)));
        assert!(!err.to_string().contains("secret-token"));
        assert!(!format!("{err:?}").contains("secret-token"));
    }
}
