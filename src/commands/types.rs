//! Command types and definitions.

use std::fmt;

use crate::UserId;
use crate::wizard::Mode;

/// Slash commands understood by the materials bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Register and show the main menu.
    Start,

    /// Leave any wizard and show the main menu.
    Menu,

    /// Show help information.
    Help,

    AddMaterial,
    DeleteFile,
    DeletePublisher,
    DeleteSubject,

    /// Add a subject, either directly (`<exam> > <subject>`) or through the
    /// wizard when no argument is given.
    AddSubject(Option<(String, String)>),

    AddSubfolder,

    /// Grant admin rights (owner only).
    AddAdmin(UserId),

    /// Revoke admin rights (owner only).
    RemoveAdmin(UserId),

    /// Send a text to every known user; without text the wizard asks for it.
    Broadcast(Option<String>),

    /// Finish an upload session.
    Done,

    /// Abandon the current wizard.
    Cancel,

    /// Post a catalog backup to the backup channel.
    Backup,

    /// Restore the catalog from the backup channel.
    Restore,

    /// Show catalog counters.
    Stats,
}

impl BotCommand {
    /// Parses a command from a message text.
    ///
    /// Returns `None` if the message is not a known command or its
    /// arguments are malformed.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let (word, args) = match after_slash.split_once(char::is_whitespace) {
            Some((word, args)) => (word, Some(args.trim()).filter(|a| !a.is_empty())),
            None => (after_slash, None),
        };
        // "/start@materials_bot" in group chats
        let cmd = word.split('@').next().unwrap_or(word).to_lowercase();

        match cmd.as_str() {
            "start" => Some(Self::Start),
            "menu" => Some(Self::Menu),
            "help" | "h" => Some(Self::Help),
            "addmaterial" | "add" => Some(Self::AddMaterial),
            "deletefile" => Some(Self::DeleteFile),
            "deletepublisher" => Some(Self::DeletePublisher),
            "deletesubject" => Some(Self::DeleteSubject),
            "addsubject" => match args {
                Some(args) => Self::parse_subject(args).map(|pair| Self::AddSubject(Some(pair))),
                None => Some(Self::AddSubject(None)),
            },
            "addsubfolder" | "addfolder" => Some(Self::AddSubfolder),
            "addadmin" => args?.parse().ok().map(Self::AddAdmin),
            "removeadmin" => args?.parse().ok().map(Self::RemoveAdmin),
            "broadcast" => Some(Self::Broadcast(args.map(str::to_owned))),
            "done" => Some(Self::Done),
            "cancel" => Some(Self::Cancel),
            "backup" => Some(Self::Backup),
            "restore" => Some(Self::Restore),
            "stats" => Some(Self::Stats),
            _ => None,
        }
    }

    /// Parses `<exam> > <subject>`.
    fn parse_subject(args: &str) -> Option<(String, String)> {
        let (exam, subject) = args.split_once('>')?;
        let (exam, subject) = (exam.trim(), subject.trim());

        if exam.is_empty() || subject.is_empty() {
            return None;
        }

        Some((exam.to_owned(), subject.to_owned()))
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Menu => "menu",
            Self::Help => "help",
            Self::AddMaterial => "addmaterial",
            Self::DeleteFile => "deletefile",
            Self::DeletePublisher => "deletepublisher",
            Self::DeleteSubject => "deletesubject",
            Self::AddSubject(_) => "addsubject",
            Self::AddSubfolder => "addsubfolder",
            Self::AddAdmin(_) => "addadmin",
            Self::RemoveAdmin(_) => "removeadmin",
            Self::Broadcast(_) => "broadcast",
            Self::Done => "done",
            Self::Cancel => "cancel",
            Self::Backup => "backup",
            Self::Restore => "restore",
            Self::Stats => "stats",
        }
    }

    /// The wizard mode this command opens, if any.
    #[must_use]
    pub const fn mode(&self) -> Option<Mode> {
        match self {
            Self::AddMaterial => Some(Mode::AddMaterial),
            Self::DeleteFile => Some(Mode::DeleteFile),
            Self::DeletePublisher => Some(Mode::DeletePublisher),
            Self::DeleteSubject => Some(Mode::DeleteSubject),
            Self::AddSubject(None) => Some(Mode::AddSubject),
            Self::AddSubfolder => Some(Mode::AddSubfolder),
            Self::Broadcast(None) => Some(Mode::Broadcast),
            _ => None,
        }
    }

    /// Commands reserved for admins.
    #[must_use]
    pub const fn is_admin_only(&self) -> bool {
        !matches!(
            self,
            Self::Start | Self::Menu | Self::Help | Self::Done | Self::Cancel
        )
    }

    /// Commands reserved for the owner.
    #[must_use]
    pub const fn is_owner_only(&self) -> bool {
        matches!(self, Self::AddAdmin(_) | Self::RemoveAdmin(_))
    }

    /// Returns all available commands with their descriptions.
    #[must_use]
    pub fn all_commands(is_admin: bool) -> Vec<(&'static str, &'static str)> {
        let mut commands = vec![
            ("/start", "Show the main menu"),
            ("/menu", "Leave the current step and show the main menu"),
            ("/cancel", "Cancel the current action"),
            ("/help", "Show this help message"),
        ];
        if is_admin {
            commands.extend([
                ("/addmaterial", "Upload files into the catalog"),
                ("/done", "Finish uploading"),
                ("/deletefile", "Delete one file"),
                ("/deletepublisher", "Delete a publisher and its files"),
                ("/addsubject [exam > subject]", "Add a subject"),
                ("/deletesubject", "Delete a subject and everything in it"),
                ("/addsubfolder", "Add a sub-folder under a publisher"),
                ("/broadcast [text]", "Message every user"),
                ("/backup", "Post a backup to the backup channel"),
                ("/restore", "Restore the newest backup"),
                ("/stats", "Show catalog statistics"),
                ("/addadmin <id>", "Grant admin rights (owner)"),
                ("/removeadmin <id>", "Revoke admin rights (owner)"),
            ]);
        }
        commands
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddSubject(Some((exam, subject))) => write!(f, "addsubject {exam} > {subject}"),
            Self::AddAdmin(id) => write!(f, "addadmin {id}"),
            Self::RemoveAdmin(id) => write!(f, "removeadmin {id}"),
            Self::Broadcast(Some(text)) => write!(f, "broadcast {text}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Result of command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/menu"), Some(BotCommand::Menu));
        assert_eq!(BotCommand::parse("/done"), Some(BotCommand::Done));
        assert_eq!(BotCommand::parse("/addmaterial"), Some(BotCommand::AddMaterial));
    }

    #[test]
    fn test_parse_not_a_command() {
        assert_eq!(BotCommand::parse("start"), None);
        assert_eq!(BotCommand::parse("/unknown"), None);
        assert_eq!(BotCommand::parse("IIT JEE"), None);
    }

    #[test]
    fn test_parse_case_insensitive_with_bot_suffix() {
        assert_eq!(BotCommand::parse("/START"), Some(BotCommand::Start));
        assert_eq!(
            BotCommand::parse("/DeleteFile@materials_bot"),
            Some(BotCommand::DeleteFile)
        );
    }

    #[test]
    fn test_parse_add_subject() {
        assert_eq!(
            BotCommand::parse("/addsubject NEET > Zoology"),
            Some(BotCommand::AddSubject(Some(("NEET".to_owned(), "Zoology".to_owned()))))
        );
        assert_eq!(BotCommand::parse("/addsubject"), Some(BotCommand::AddSubject(None)));
        assert_eq!(BotCommand::parse("/addsubject NEET"), None);
        assert_eq!(BotCommand::parse("/addsubject > Zoology"), None);
    }

    #[test]
    fn test_parse_admin_ids() {
        assert_eq!(BotCommand::parse("/addadmin 12345"), Some(BotCommand::AddAdmin(12345)));
        assert_eq!(BotCommand::parse("/removeadmin 7"), Some(BotCommand::RemoveAdmin(7)));
        assert_eq!(BotCommand::parse("/addadmin"), None);
        assert_eq!(BotCommand::parse("/addadmin bob"), None);
    }

    #[test]
    fn test_parse_broadcast() {
        assert_eq!(BotCommand::parse("/broadcast"), Some(BotCommand::Broadcast(None)));
        assert_eq!(
            BotCommand::parse("/broadcast  New papers uploaded "),
            Some(BotCommand::Broadcast(Some("New papers uploaded".to_owned())))
        );
    }

    #[test]
    fn test_permissions() {
        assert!(!BotCommand::Start.is_admin_only());
        assert!(!BotCommand::Cancel.is_admin_only());
        assert!(BotCommand::Stats.is_admin_only());
        assert!(BotCommand::AddAdmin(1).is_owner_only());
        assert_eq!(BotCommand::AddSubject(None).mode(), Some(Mode::AddSubject));
        assert_eq!(BotCommand::Broadcast(Some("x".into())).mode(), None);
    }
}
