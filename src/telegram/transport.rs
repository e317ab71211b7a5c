//! Transport boundary between the bots and Telegram.
//!
//! Bot logic only talks to these traits; [`super::TelegramBot`] implements
//! them on top of grammers, tests implement them with in-memory recorders.

use async_trait::async_trait;
use thiserror::Error;

use crate::ChatId;
use crate::catalog::{FileKind, FileRecord};

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("Chat {0} is private or forbids posting")]
    Forbidden(ChatId),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Chat {0} has not been seen by this client")]
    UnknownPeer(ChatId),

    #[error("Invalid file handle: {0}")]
    InvalidFileHandle(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

impl TransportError {
    /// Whether the target chat should be deactivated after this error.
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden(_) | Self::UnknownPeer(_))
    }
}

/// Reply keyboard made of text buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<String>>,
}

impl Keyboard {
    /// Lays `options` out `per_row` buttons to a row.
    #[must_use]
    pub fn grid<S: AsRef<str>>(options: &[S], per_row: usize) -> Self {
        let rows = options
            .chunks(per_row.max(1))
            .map(|row| row.iter().map(|o| o.as_ref().to_owned()).collect())
            .collect();
        Self { rows }
    }

    #[must_use]
    pub fn row<S: AsRef<str>>(mut self, buttons: &[S]) -> Self {
        if !buttons.is_empty() {
            self.rows
                .push(buttons.iter().map(|b| b.as_ref().to_owned()).collect());
        }
        self
    }

    /// All button labels, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(String::as_str)
    }
}

/// A message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingMessage {
    Text {
        text: String,
        keyboard: Option<Keyboard>,
    },
    File {
        record: FileRecord,
    },
}

impl OutgoingMessage {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: None,
        }
    }

    #[must_use]
    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Text {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    #[must_use]
    pub fn file(record: FileRecord) -> Self {
        Self::File { record }
    }

    /// Text of a text message, caption of a file.
    #[must_use]
    pub fn body(&self) -> &str {
        match self {
            Self::Text { text, .. } => text,
            Self::File { record } => &record.caption,
        }
    }
}

/// Media attached to an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMedia {
    pub file_id: String,
    pub kind: FileKind,
    pub file_name: Option<String>,
    pub caption: String,
}

impl IncomingMedia {
    /// Converts the upload into a catalog record; `fallback_index` names
    /// files that carry neither a file name nor a caption.
    #[must_use]
    pub fn into_record(self, fallback_index: usize) -> FileRecord {
        let display_name = self
            .file_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                self.caption
                    .lines()
                    .next()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_owned)
            })
            .unwrap_or_else(|| format!("{} {fallback_index}", capitalize(&self.kind.to_string())));
        FileRecord::new(self.file_id, self.kind, display_name, self.caption)
    }
}

/// A message delivered to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat: ChatId,
    pub sender: ChatId,
    pub text: String,
    pub media: Option<IncomingMedia>,
}

/// A chat from the account's dialog list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub id: ChatId,
    pub title: String,
    pub is_channel: bool,
}

/// Sending side of the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one message to a chat.
    async fn send(&self, chat: ChatId, message: OutgoingMessage) -> Result<(), TransportError>;

    /// Texts of the most recent messages in a chat, newest first.
    async fn recent_messages(&self, chat: ChatId, limit: usize) -> Result<Vec<String>, TransportError>;

    /// The account's dialogs.
    async fn dialogs(&self) -> Result<Vec<Dialog>, TransportError>;
}

/// Why a sign-in step did not complete.
#[derive(Debug)]
pub enum SignInFailure<P> {
    InvalidCode,
    PasswordRequired(P),
    InvalidPassword(P),
    Failed(String),
}

/// Phone-number login of a user account.
#[async_trait]
pub trait AccountLogin: Send + Sync {
    type CodeToken: Send + Sync;
    type PasswordToken: Send + Sync;

    /// Asks Telegram to send a login code to `phone`.
    async fn request_code(&self, phone: &str) -> Result<Self::CodeToken, TransportError>;

    async fn sign_in(
        &self,
        token: &Self::CodeToken,
        code: &str,
    ) -> Result<(), SignInFailure<Self::PasswordToken>>;

    async fn check_password(
        &self,
        token: Self::PasswordToken,
        password: &str,
    ) -> Result<(), SignInFailure<Self::PasswordToken>>;
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_grid() {
        let keyboard = Keyboard::grid(&["a", "b", "c"], 2).row(&["Back"]);
        assert_eq!(
            keyboard.rows,
            vec![vec!["a", "b"], vec!["c"], vec!["Back"]]
        );
        assert_eq!(keyboard.buttons().count(), 4);
    }

    #[test]
    fn test_media_record_names() {
        let named = IncomingMedia {
            file_id: "x".to_owned(),
            kind: FileKind::Document,
            file_name: Some("notes.pdf".to_owned()),
            caption: "Chapter 1".to_owned(),
        };
        assert_eq!(named.into_record(1).display_name, "notes.pdf");

        let captioned = IncomingMedia {
            file_id: "y".to_owned(),
            kind: FileKind::Photo,
            file_name: None,
            caption: "Diagram\nsecond line".to_owned(),
        };
        assert_eq!(captioned.into_record(2).display_name, "Diagram");

        let bare = IncomingMedia {
            file_id: "z".to_owned(),
            kind: FileKind::Video,
            file_name: None,
            caption: String::new(),
        };
        assert_eq!(bare.into_record(3).display_name, "Video 3");
    }

    #[test]
    fn test_forbidden_classification() {
        assert!(TransportError::Forbidden(1).is_forbidden());
        assert!(!TransportError::FloodWait(3).is_forbidden());
    }
}
