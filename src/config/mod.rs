//! Configuration module.
//!
//! Telegram API credentials and bot settings, read from the environment
//! (optionally seeded from a `.env` file).

mod settings;

pub use settings::{BotSettings, ConfigError, TelegramConfig};
