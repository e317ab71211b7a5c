//! Telegram transport module.
//!
//! The bots talk to Telegram through the [`Transport`] and [`AccountLogin`]
//! traits; [`TelegramBot`] implements both on top of grammers.

mod client;
mod file_handle;
mod rate_limiter;
mod transport;

pub(crate) use client::{log_preview, redact_phone};
pub use client::TelegramBot;
pub use file_handle::FileHandle;
pub use rate_limiter::{OperationKind, SendPacer, SlidingWindowLimiter};
pub use transport::{
    AccountLogin, Dialog, IncomingMedia, IncomingMessage, Keyboard, OutgoingMessage, SignInFailure,
    Transport, TransportError,
};
