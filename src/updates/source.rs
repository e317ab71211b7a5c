//! Where updates come from and who handles them.

use std::fmt;

use async_trait::async_trait;

use crate::telegram::{IncomingMessage, TelegramBot};

/// A stream of incoming messages.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// The next message, or `None` once the stream has ended.
    async fn next_update(&self) -> Option<IncomingMessage>;
}

#[async_trait]
impl UpdateSource for TelegramBot {
    async fn next_update(&self) -> Option<IncomingMessage> {
        self.next_message().await
    }
}

/// Processes one update at a time; many may run concurrently.
#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    type Error: fmt::Display + Send + 'static;

    async fn handle(&self, message: IncomingMessage) -> Result<(), Self::Error>;

    /// Called when `handle` failed or panicked for `message`.
    async fn on_failure(&self, message: &IncomingMessage);

    /// Periodic housekeeping.
    async fn sweep(&self) {}
}
