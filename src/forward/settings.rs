//! Per-user forwarding settings and their JSON store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{ChatId, UserId};

/// Telegram's limit for a text message.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4096;

/// Errors from reading or writing forward settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A channel picked from the user's dialogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: ChatId,
    pub title: String,
}

/// A channel messages are forwarded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetChannel {
    pub id: ChatId,
    pub title: String,

    /// Cleared when the channel refuses posts.
    #[serde(default = "default_true")]
    pub active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl TargetChannel {
    #[must_use]
    pub fn new(id: ChatId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            active: true,
            last_error: None,
        }
    }
}

/// Replace `original` with `replacement` anywhere in the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRule {
    pub original: String,
    pub replacement: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Replace a link (or part of one) with another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRule {
    pub original: String,
    pub replacement: String,
}

/// Forwarding counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardStats {
    pub forwarded: u64,
    pub failed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_forward_at: Option<DateTime<Utc>>,
}

/// Everything one user configured for auto-forwarding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardSettings {
    pub active: bool,
    pub forward_media: bool,
    pub remove_links: bool,
    pub remove_usernames: bool,
    pub preserve_query: bool,
    pub delay_seconds: u64,

    /// Longest text sent; 0 disables truncation.
    pub max_message_length: usize,

    pub source: Option<ChannelRef>,
    pub targets: Vec<TargetChannel>,

    /// Applied in order.
    pub word_rules: Vec<WordRule>,
    pub link_rules: Vec<LinkRule>,
    pub stats: ForwardStats,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            active: false,
            forward_media: true,
            remove_links: false,
            remove_usernames: false,
            preserve_query: false,
            delay_seconds: 0,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            source: None,
            targets: Vec::new(),
            word_rules: Vec::new(),
            link_rules: Vec::new(),
            stats: ForwardStats::default(),
        }
    }
}

impl ForwardSettings {
    /// Targets that still accept posts.
    pub fn active_targets(&self) -> impl Iterator<Item = &TargetChannel> {
        self.targets.iter().filter(|t| t.active)
    }

    /// Whether forwarding can run: switched on, with a source and at least
    /// one active target.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.active && self.source.is_some() && self.active_targets().next().is_some()
    }

    /// Adds a target; re-adding a deactivated one reactivates it.
    /// Returns `false` when it was already an active target.
    pub fn add_target(&mut self, channel: ChannelRef) -> bool {
        if let Some(target) = self.targets.iter_mut().find(|t| t.id == channel.id) {
            let reactivated = !target.active;
            target.active = true;
            target.last_error = None;
            target.title = channel.title;
            return reactivated;
        }
        self.targets.push(TargetChannel::new(channel.id, channel.title));
        true
    }

    /// Removes a target. Returns whether it was present.
    pub fn remove_target(&mut self, id: ChatId) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.id != id);
        self.targets.len() != before
    }
}

const fn default_true() -> bool {
    true
}

/// One JSON file per user under a directory; the user's account session
/// lives next to it.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn settings_path(&self, user: UserId) -> PathBuf {
        self.dir.join(format!("{user}.json"))
    }

    /// Where the user's account session is stored.
    #[must_use]
    pub fn session_path(&self, user: UserId) -> PathBuf {
        self.dir.join(format!("{user}.session"))
    }

    /// Loads a user's settings; defaults when the user has none yet.
    pub fn load(&self, user: UserId) -> Result<ForwardSettings, SettingsError> {
        let path = self.settings_path(user);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings for {}, using defaults", user);
                return Ok(ForwardSettings::default());
            }
            Err(source) => return Err(SettingsError::Read { path, source }),
        };

        serde_json::from_str(&content).map_err(|source| SettingsError::Corrupt { path, source })
    }

    /// Writes a user's settings through a temporary file and a rename.
    pub fn save(&self, user: UserId, settings: &ForwardSettings) -> Result<(), SettingsError> {
        let path = self.settings_path(user);
        let json = serde_json::to_string_pretty(settings)?;

        std::fs::create_dir_all(&self.dir).map_err(|source| SettingsError::Write {
            path: self.dir.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|source| SettingsError::Write {
                path: path.clone(),
                source,
            })?;

        debug!("Settings for {} saved", user);
        Ok(())
    }

    /// Users with a stored account session.
    pub fn users_with_sessions(&self) -> Result<Vec<UserId>, SettingsError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut users: Vec<UserId> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "session"))
            .filter_map(|path| path.file_stem()?.to_str()?.parse().ok())
            .collect();
        users.sort_unstable();
        info!("Found {} stored account sessions", users.len());
        Ok(users)
    }

    /// Deletes the user's account session file.
    pub fn remove_session(&self, user: UserId) -> Result<(), SettingsError> {
        let path = self.session_path(user);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SettingsError::Write { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ForwardSettings::default();
        assert!(settings.forward_media);
        assert!(!settings.active);
        assert_eq!(settings.max_message_length, DEFAULT_MAX_MESSAGE_LENGTH);
        assert!(!settings.is_ready());
    }

    #[test]
    fn test_missing_settings_load_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.load(42).unwrap(), ForwardSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("users"));

        let mut settings = ForwardSettings {
            active: true,
            source: Some(ChannelRef {
                id: -1001,
                title: "Source".to_owned(),
            }),
            ..ForwardSettings::default()
        };
        settings.add_target(ChannelRef {
            id: -1002,
            title: "Mirror".to_owned(),
        });
        settings.word_rules.push(WordRule {
            original: "foo".to_owned(),
            replacement: "bar".to_owned(),
            case_sensitive: false,
        });
        store.save(7, &settings).unwrap();

        assert_eq!(store.load(7).unwrap(), settings);
        assert!(settings.is_ready());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        std::fs::write(store.settings_path(3), r#"{"delay_seconds": 5}"#).unwrap();

        let settings = store.load(3).unwrap();
        assert_eq!(settings.delay_seconds, 5);
        assert!(settings.forward_media);
    }

    #[test]
    fn test_readding_target_reactivates() {
        let mut settings = ForwardSettings::default();
        let channel = ChannelRef {
            id: 5,
            title: "T".to_owned(),
        };
        assert!(settings.add_target(channel.clone()));
        assert!(!settings.add_target(channel.clone()));

        settings.targets[0].active = false;
        settings.targets[0].last_error = Some("forbidden".to_owned());
        assert!(settings.add_target(channel));
        assert!(settings.targets[0].active);
        assert_eq!(settings.targets[0].last_error, None);

        assert!(settings.remove_target(5));
        assert!(!settings.remove_target(5));
    }

    #[test]
    fn test_users_with_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        std::fs::write(store.session_path(20), b"").unwrap();
        std::fs::write(store.session_path(10), b"").unwrap();
        std::fs::write(store.settings_path(30), b"{}").unwrap();
        std::fs::write(dir.path().join("notes.session"), b"").unwrap();

        assert_eq!(store.users_with_sessions().unwrap(), vec![10, 20]);

        store.remove_session(10).unwrap();
        store.remove_session(10).unwrap();
        assert_eq!(store.users_with_sessions().unwrap(), vec![20]);
    }
}
