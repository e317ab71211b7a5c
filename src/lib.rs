//! Study Forward Bot Library
//!
//! Two Telegram bots built on one MTProto transport:
//! - a study-materials bot: admins upload files into an
//!   exam → subject → publisher → sub-folder catalog through a step-by-step
//!   wizard, users browse it the same way
//! - an auto-forward bot: users log in their own account, pick a source
//!   channel and targets, and messages are re-posted with text substitution

pub mod catalog;
pub mod commands;
pub mod config;
pub mod forward;
pub mod session;
pub mod telegram;
pub mod updates;
pub mod wizard;

/// Telegram user identifier.
pub type UserId = i64;

/// Telegram chat (user, group or channel) identifier.
pub type ChatId = i64;
