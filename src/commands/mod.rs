//! Command handling module.
//!
//! Processes slash commands and wizard input sent to the materials bot,
//! and keeps the catalog saved.

mod handler;
mod service;
mod types;

pub use handler::{CommandHandler, HandlerError};
pub use service::{CatalogService, StorageProblem};
pub use types::{BotCommand, CommandResult};
