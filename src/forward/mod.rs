//! Auto-forward bot.
//!
//! Users log in their own Telegram account through the bot, choose a
//! source channel and targets, and every source post is re-sent to the
//! targets after [`transform`] rewrote its text.

mod accounts;
mod commands;
mod forwarder;
mod login;
mod service;
mod settings;
mod transform;

pub use accounts::{Account, AccountConnector, SessionConnector};
pub use commands::{ForwardCommand, SettingChange, SettingError, Toggle};
pub use forwarder::{ForwardReport, Forwarder, SkipReason};
pub use login::{LoginError, LoginFlow, LoginStep, MAX_ATTEMPTS, parse_code};
pub use service::{ForwardError, ForwardService};
pub use settings::{
    ChannelRef, DEFAULT_MAX_MESSAGE_LENGTH, ForwardSettings, ForwardStats, LinkRule,
    SettingsError, SettingsStore, TargetChannel, WordRule,
};
pub use transform::transform;
