//! Error types for notification delivery

use thiserror::Error;

/// Error type for notification delivery
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Chat API unreachable or timed out
    #[error("chat API request failed: {0}")]
    Request(reqwest::Error),

    /// Chat API refused the call
    #[error("chat API error {code}: {description}")]
    Api { code: i64, description: String },

    /// Message handle does not refer to a message this notifier sent
    #[error("unknown message {message_id} for {recipient}")]
    UnknownMessage { recipient: String, message_id: i64 },

    /// Recipient is not reachable through this channel
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Request URLs carry the bot token, so they never reach the error
impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Request(err.without_url())
    }
}

/// Result type for notification delivery
pub type Result<T> = std::result::Result<T, NotifyError>;
