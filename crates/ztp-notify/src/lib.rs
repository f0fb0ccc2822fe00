//! ZTP progress notifications
//!
//! Progress is reported as one chat message per recipient that is edited in
//! place as the run advances. [`TelegramNotifier`] delivers through the
//! Telegram Bot API; [`MemoryNotifier`] records deliveries for tests.

pub mod error;
pub mod notifier;
pub mod telegram;

pub use error::{NotifyError, Result};
pub use notifier::{Delivery, MemoryNotifier, MessageHandle, Notifier};
pub use telegram::{TelegramConfig, TelegramNotifier, DEFAULT_API_URL};
