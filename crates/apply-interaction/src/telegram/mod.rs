//! Telegram transport: Bot API client and the channel built on it.

pub mod api;
pub mod channel;

pub use api::{TelegramApi, TelegramApiError, Update};
pub use channel::TelegramChannel;
