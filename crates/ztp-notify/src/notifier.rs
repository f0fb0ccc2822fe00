//! Notifier seam and in-memory implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{NotifyError, Result};

/// Identifies a sent message so it can be edited later
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub recipient: String,
    pub message_id: i64,
}

/// Chat channel used for progress messages
///
/// Delivery is fire-and-forget: callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a new message to `recipient`
    async fn send_message(&self, recipient: &str, text: &str) -> Result<MessageHandle>;

    /// Replace the text of a message sent earlier
    async fn edit_message(&self, handle: &MessageHandle, text: &str) -> Result<()>;
}

/// Something a [`MemoryNotifier`] was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { handle: MessageHandle, text: String },
    Edited { handle: MessageHandle, text: String },
}

impl Delivery {
    pub fn text(&self) -> &str {
        match self {
            Delivery::Sent { text, .. } | Delivery::Edited { text, .. } => text,
        }
    }
}

#[derive(Debug, Default)]
struct Inbox {
    next_id: i64,
    deliveries: Vec<Delivery>,
    fail_recipients: Vec<String>,
}

/// Notifier that records every delivery
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    inbox: Mutex<Inbox>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn inbox(&self) -> MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every delivery to `recipient` fail
    pub fn fail_for(&self, recipient: impl Into<String>) {
        self.inbox().fail_recipients.push(recipient.into());
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.inbox().deliveries.clone()
    }

    pub fn delivery_count(&self) -> usize {
        self.inbox().deliveries.len()
    }

    /// Latest text of the message held by `handle`
    pub fn current_text(&self, handle: &MessageHandle) -> Option<String> {
        self.inbox()
            .deliveries
            .iter()
            .rev()
            .find(|d| match d {
                Delivery::Sent { handle: h, .. } | Delivery::Edited { handle: h, .. } => h == handle,
            })
            .map(|d| d.text().to_string())
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send_message(&self, recipient: &str, text: &str) -> Result<MessageHandle> {
        let mut inbox = self.inbox();
        if inbox.fail_recipients.iter().any(|r| r == recipient) {
            return Err(NotifyError::InvalidRecipient(recipient.to_string()));
        }
        inbox.next_id += 1;
        let handle = MessageHandle {
            recipient: recipient.to_string(),
            message_id: inbox.next_id,
        };
        inbox.deliveries.push(Delivery::Sent {
            handle: handle.clone(),
            text: text.to_string(),
        });
        Ok(handle)
    }

    async fn edit_message(&self, handle: &MessageHandle, text: &str) -> Result<()> {
        let mut inbox = self.inbox();
        if inbox.fail_recipients.iter().any(|r| *r == handle.recipient) {
            return Err(NotifyError::InvalidRecipient(handle.recipient.clone()));
        }
        let known = inbox
            .deliveries
            .iter()
            .any(|d| matches!(d, Delivery::Sent { handle: h, .. } if h == handle));
        if !known {
            return Err(NotifyError::UnknownMessage {
                recipient: handle.recipient.clone(),
                message_id: handle.message_id,
            });
        }
        inbox.deliveries.push(Delivery::Edited {
            handle: handle.clone(),
            text: text.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_then_edit() {
        let notifier = MemoryNotifier::new();
        let handle = notifier.send_message("ops", "step 1").await.unwrap();
        notifier.edit_message(&handle, "step 2").await.unwrap();

        assert_eq!(notifier.delivery_count(), 2);
        assert_eq!(notifier.current_text(&handle).as_deref(), Some("step 2"));
    }

    #[tokio::test]
    async fn test_handles_are_distinct() {
        let notifier = MemoryNotifier::new();
        let a = notifier.send_message("ops", "x").await.unwrap();
        let b = notifier.send_message("noc", "x").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(b.recipient, "noc");
    }

    #[tokio::test]
    async fn test_edit_unknown_message() {
        let notifier = MemoryNotifier::new();
        let handle = MessageHandle {
            recipient: "ops".to_string(),
            message_id: 42,
        };
        let err = notifier.edit_message(&handle, "x").await.unwrap_err();
        assert!(matches!(err, NotifyError::UnknownMessage { message_id: 42, .. }));
    }

    #[tokio::test]
    async fn test_failing_recipient() {
        let notifier = MemoryNotifier::new();
        notifier.fail_for("broken");
        assert!(notifier.send_message("broken", "x").await.is_err());
        assert!(notifier.send_message("ops", "x").await.is_ok());
        assert_eq!(notifier.delivery_count(), 1);
    }
}
