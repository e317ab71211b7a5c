//! Application settings and Telegram configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ChatId, UserId};

/// Telegram API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Token issued by `@BotFather`.
    pub bot_token: String,

    /// Path to the bot's session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("bot.session")
}

impl TelegramConfig {
    /// Creates a new Telegram configuration.
    #[must_use]
    pub fn new(api_id: i32, api_hash: String, bot_token: String) -> Self {
        Self {
            api_id,
            api_hash,
            bot_token,
            session_path: default_session_path(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `API_ID`, `API_HASH` and `BOT_TOKEN` to be set;
    /// `SESSION_PATH` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_id: i32 = lookup("API_ID")
            .ok_or(ConfigError::MissingEnvVar("API_ID"))?
            .trim()
            .parse()
            .ok()
            .filter(|id| *id > 0)
            .ok_or(ConfigError::InvalidApiId)?;

        let api_hash = lookup("API_HASH").ok_or(ConfigError::MissingEnvVar("API_HASH"))?;
        let bot_token = lookup("BOT_TOKEN").ok_or(ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let session_path = lookup("SESSION_PATH").map_or_else(default_session_path, PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            bot_token,
            session_path,
        })
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Owner account; always an admin and the only one who may appoint admins.
    pub owner_id: Option<UserId>,

    /// Channel holding remote catalog backups.
    pub backup_channel_id: Option<ChatId>,

    /// Path to the catalog JSON file.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Directory for per-user forward settings and account sessions.
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,

    /// Operations allowed per user and kind within one window.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: usize,

    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_secs: u64,

    /// Wizard sessions idle for longer than this are dropped.
    #[serde(default = "default_session_idle")]
    pub session_idle_secs: u64,

    /// Minimum spacing between outgoing messages, in milliseconds.
    #[serde(default = "default_send_interval")]
    pub send_interval_ms: u64,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("study_materials.json")
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("sessions")
}

const fn default_rate_limit_max() -> usize {
    20
}

const fn default_rate_limit_window() -> u64 {
    60
}

const fn default_session_idle() -> u64 {
    60 * 60
}

const fn default_send_interval() -> u64 {
    50
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            owner_id: None,
            backup_channel_id: None,
            catalog_path: default_catalog_path(),
            sessions_dir: default_sessions_dir(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_secs: default_rate_limit_window(),
            session_idle_secs: default_session_idle(),
            send_interval_ms: default_send_interval(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            owner_id: parsed(&lookup, "ADMIN_ID"),
            backup_channel_id: parsed(&lookup, "BACKUP_CHANNEL_ID"),
            catalog_path: lookup("CATALOG_PATH").map_or_else(default_catalog_path, PathBuf::from),
            sessions_dir: lookup("SESSIONS_DIR").map_or_else(default_sessions_dir, PathBuf::from),
            rate_limit_max: parsed(&lookup, "RATE_LIMIT_MAX")
                .unwrap_or_else(default_rate_limit_max),
            rate_limit_window_secs: parsed(&lookup, "RATE_LIMIT_WINDOW_SECS")
                .unwrap_or_else(default_rate_limit_window),
            session_idle_secs: parsed(&lookup, "SESSION_IDLE_SECS")
                .unwrap_or_else(default_session_idle),
            send_interval_ms: parsed(&lookup, "SEND_INTERVAL_MS")
                .unwrap_or_else(default_send_interval),
        }
    }

    #[must_use]
    pub const fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    #[must_use]
    pub const fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

/// Parses a trimmed variable, treating malformed values as unset.
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| (*v).to_owned())
    }

    #[test]
    fn test_default_settings() {
        let settings = BotSettings::default();
        assert_eq!(settings.owner_id, None);
        assert_eq!(settings.rate_limit_max, 20);
        assert_eq!(settings.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(settings.catalog_path, PathBuf::from("study_materials.json"));
    }

    #[test]
    fn test_settings_from_env() {
        let settings = BotSettings::from_lookup(lookup(&[
            ("ADMIN_ID", "12345"),
            ("BACKUP_CHANNEL_ID", "-1001234567890"),
            ("RATE_LIMIT_MAX", "not a number"),
            ("SESSION_IDLE_SECS", " 90 "),
        ]));
        assert_eq!(settings.owner_id, Some(12345));
        assert_eq!(settings.backup_channel_id, Some(-1_001_234_567_890));
        assert_eq!(settings.rate_limit_max, 20);
        assert_eq!(settings.session_idle(), Duration::from_secs(90));
    }

    #[test]
    fn test_settings_parse_every_numeric_key() {
        let settings = BotSettings::from_lookup(lookup(&[
            ("ADMIN_ID", "7"),
            ("BACKUP_CHANNEL_ID", "-100500"),
            ("RATE_LIMIT_MAX", "5"),
            ("RATE_LIMIT_WINDOW_SECS", "30"),
            ("SESSION_IDLE_SECS", "120"),
            ("SEND_INTERVAL_MS", "250"),
        ]));
        assert_eq!(settings.owner_id, Some(7));
        assert_eq!(settings.backup_channel_id, Some(-100_500));
        assert_eq!(settings.rate_limit_max, 5);
        assert_eq!(settings.rate_limit_window(), Duration::from_secs(30));
        assert_eq!(settings.session_idle(), Duration::from_secs(120));
        assert_eq!(settings.send_interval_ms, 250);
    }

    #[test]
    fn test_telegram_config_new() {
        let config = TelegramConfig::new(12345, "abc123".to_owned(), "1:token".to_owned());
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.api_hash, "abc123");
        assert_eq!(config.session_path, PathBuf::from("bot.session"));
    }

    #[test]
    fn test_telegram_config_errors() {
        let missing = TelegramConfig::from_lookup(lookup(&[("API_ID", "1"), ("API_HASH", "h")]));
        assert!(matches!(missing, Err(ConfigError::MissingEnvVar("BOT_TOKEN"))));

        let invalid = TelegramConfig::from_lookup(lookup(&[
            ("API_ID", "-5"),
            ("API_HASH", "h"),
            ("BOT_TOKEN", "t"),
        ]));
        assert!(matches!(invalid, Err(ConfigError::InvalidApiId)));

        let ok = TelegramConfig::from_lookup(lookup(&[
            ("API_ID", "42"),
            ("API_HASH", "h"),
            ("BOT_TOKEN", "t"),
            ("SESSION_PATH", "data/bot.session"),
        ]))
        .unwrap();
        assert_eq!(ok.session_path, PathBuf::from("data/bot.session"));
    }
}
