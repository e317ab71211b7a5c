//! User-account clients, one per person who logged in through the bot.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::settings::SettingsStore;
use crate::UserId;
use crate::telegram::{AccountLogin, TelegramBot, Transport, TransportError};
use crate::updates::UpdateSource;

/// A logged-in (or logging-in) user account.
#[async_trait]
pub trait Account: Transport + AccountLogin + UpdateSource + 'static {
    async fn is_authorized(&self) -> Result<bool, TransportError>;

    async fn sign_out(&self) -> Result<(), TransportError>;

    fn disconnect(&self);
}

#[async_trait]
impl Account for TelegramBot {
    async fn is_authorized(&self) -> Result<bool, TransportError> {
        Self::is_authorized(self).await
    }

    async fn sign_out(&self) -> Result<(), TransportError> {
        Self::sign_out(self).await
    }

    fn disconnect(&self) {
        Self::disconnect(self);
    }
}

/// Opens the account client of a bot user.
#[async_trait]
pub trait AccountConnector: Send + Sync + 'static {
    type Account: Account;

    async fn connect(&self, user: UserId) -> Result<Self::Account, TransportError>;

    /// Forgets the user's stored session.
    fn forget(&self, user: UserId);
}

/// Connects grammers clients backed by the session files of a
/// [`SettingsStore`].
#[derive(Clone)]
pub struct SessionConnector {
    api_id: i32,
    api_hash: String,
    store: SettingsStore,
    send_interval_ms: u64,
}

impl SessionConnector {
    #[must_use]
    pub fn new(api_id: i32, api_hash: impl Into<String>, store: SettingsStore, send_interval_ms: u64) -> Self {
        Self {
            api_id,
            api_hash: api_hash.into(),
            store,
            send_interval_ms,
        }
    }
}

#[async_trait]
impl AccountConnector for SessionConnector {
    type Account = TelegramBot;

    async fn connect(&self, user: UserId) -> Result<TelegramBot, TransportError> {
        debug!("Opening account session for {}", user);
        TelegramBot::connect(
            self.api_id,
            &self.api_hash,
            &self.store.session_path(user),
            self.send_interval_ms,
        )
        .await
    }

    fn forget(&self, user: UserId) {
        if let Err(e) = self.store.remove_session(user) {
            warn!("Failed to forget session of {}: {}", user, e);
        }
    }
}

impl std::fmt::Debug for SessionConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConnector")
            .field("api_id", &self.api_id)
            .field("dir", &self.store.dir())
            .finish_non_exhaustive()
    }
}
