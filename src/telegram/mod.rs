//! Telegram Bot API event source.

pub mod poller;

pub use poller::{connect_bot, Routing, TelegramPoller, UpdateFeed};
