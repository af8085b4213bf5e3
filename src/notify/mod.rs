pub mod telegram;

pub use telegram::TelegramNotifier;

use crate::common::Result;

/// Delivers a text message to a chat.
pub trait Notifier {
    fn send(&self, chat_id: &str, text: &str) -> Result<()>;
}
