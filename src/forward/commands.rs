//! Command surface of the auto-forward bot and the `/settings` editor.

use std::fmt::Write as _;

use thiserror::Error;

use super::login::parse_code;
use super::settings::{ChannelRef, ForwardSettings, LinkRule, WordRule};
use crate::telegram::Dialog;

/// Commands understood by the auto-forward bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardCommand {
    Start,
    Help,
    /// `/login [+phone]`
    Login(Option<String>),
    /// `/code <digits>` or `AUTOX<digits>`; `None` when the digits are
    /// malformed.
    Code(Option<String>),
    Password(String),
    Dashboard,
    /// `/settings` or `/settings <key> <value>`
    Settings(Option<String>),
    Logout,
}

impl ForwardCommand {
    /// Parses a message. Returns `None` for anything that is not a command.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(code) = parse_code(text) {
            return Some(Self::Code(Some(code)));
        }
        if !text.starts_with('/') {
            return None;
        }

        let (word, rest) = text.split_once(char::is_whitespace).unwrap_or((text, ""));
        let word = word.split('@').next().unwrap_or(word).to_lowercase();
        let rest = rest.trim();
        let arg = (!rest.is_empty()).then(|| rest.to_owned());

        match word.as_str() {
            "/start" => Some(Self::Start),
            "/help" => Some(Self::Help),
            "/login" => Some(Self::Login(arg)),
            "/code" => Some(Self::Code(None)),
            "/password" => Some(Self::Password(rest.to_owned())),
            "/dashboard" => Some(Self::Dashboard),
            "/settings" => Some(Self::Settings(arg)),
            "/logout" => Some(Self::Logout),
            _ => None,
        }
    }
}

/// Which boolean flag a `/settings` toggle sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Media,
    Links,
    Usernames,
    Query,
}

/// One `/settings <key> <value>` edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    Toggle(Toggle, bool),
    Delay(u64),
    MaxLength(usize),
    /// 1-based index into the dashboard's dialog list.
    Source(usize),
    AddTarget(usize),
    /// 1-based index into the target list.
    RemoveTarget(usize),
    Word {
        from: String,
        to: String,
        case_sensitive: bool,
    },
    Link {
        from: String,
        to: String,
    },
    ClearWords,
    ClearLinks,
    Active(bool),
}

/// Why a `/settings` edit was not applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingError {
    #[error("Unknown setting '{0}'. Send /help for the list.")]
    UnknownKey(String),

    #[error("Usage: /settings {0}")]
    Usage(&'static str),

    #[error("Number {index} is not in the list (1-{len}). Open /dashboard to see the list.")]
    OutOfRange { index: usize, len: usize },

    #[error("Set a source and at least one active target before starting.")]
    NotReady,
}

impl SettingChange {
    /// Parses the text after `/settings`.
    pub fn parse(args: &str) -> Result<Self, SettingError> {
        let args = args.trim();
        let (key, value) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
        let value = value.trim();

        match key.to_lowercase().as_str() {
            "media" => Ok(Self::Toggle(Toggle::Media, on_off(value, "media on|off")?)),
            "links" => Ok(Self::Toggle(Toggle::Links, on_off(value, "links on|off")?)),
            "usernames" => Ok(Self::Toggle(
                Toggle::Usernames,
                on_off(value, "usernames on|off")?,
            )),
            "query" => Ok(Self::Toggle(Toggle::Query, on_off(value, "query on|off")?)),
            "delay" => value
                .parse()
                .map(Self::Delay)
                .map_err(|_| SettingError::Usage("delay <seconds>")),
            "maxlen" => value
                .parse()
                .map(Self::MaxLength)
                .map_err(|_| SettingError::Usage("maxlen <characters, 0 for no limit>")),
            "source" => index(value, "source <n>").map(Self::Source),
            "target" => {
                let (action, n) = value.split_once(char::is_whitespace).unwrap_or((value, ""));
                match action.to_lowercase().as_str() {
                    "add" => index(n, "target add|remove <n>").map(Self::AddTarget),
                    "remove" => index(n, "target add|remove <n>").map(Self::RemoveTarget),
                    _ => Err(SettingError::Usage("target add|remove <n>")),
                }
            }
            "word" | "wordcase" => {
                let (from, to) = rule(value, "word <from> => <to>")?;
                Ok(Self::Word {
                    from,
                    to,
                    case_sensitive: key.eq_ignore_ascii_case("wordcase"),
                })
            }
            "link" => {
                let (from, to) = rule(value, "link <from> => <to>")?;
                Ok(Self::Link { from, to })
            }
            "clear" => match value.to_lowercase().as_str() {
                "words" => Ok(Self::ClearWords),
                "links" => Ok(Self::ClearLinks),
                _ => Err(SettingError::Usage("clear words|links")),
            },
            "start" => Ok(Self::Active(true)),
            "stop" => Ok(Self::Active(false)),
            _ => Err(SettingError::UnknownKey(key.to_owned())),
        }
    }

    /// Applies the edit. `dialogs` is the list last shown on the
    /// dashboard. Returns a confirmation for the user.
    pub fn apply(
        self,
        settings: &mut ForwardSettings,
        dialogs: &[Dialog],
    ) -> Result<String, SettingError> {
        let message = match self {
            Self::Toggle(toggle, on) => {
                let (flag, name) = match toggle {
                    Toggle::Media => (&mut settings.forward_media, "Media forwarding"),
                    Toggle::Links => (&mut settings.remove_links, "Link removal"),
                    Toggle::Usernames => (&mut settings.remove_usernames, "Username removal"),
                    Toggle::Query => (&mut settings.preserve_query, "Query preservation"),
                };
                *flag = on;
                format!("{name} {}.", if on { "on" } else { "off" })
            }
            Self::Delay(secs) => {
                settings.delay_seconds = secs;
                format!("Delay between targets: {secs}s.")
            }
            Self::MaxLength(max) => {
                settings.max_message_length = max;
                if max == 0 {
                    "Messages are no longer truncated.".to_owned()
                } else {
                    format!("Messages are cut to {max} characters.")
                }
            }
            Self::Source(n) => {
                let channel = pick(dialogs, n)?;
                let message = format!("Source: {}.", channel.title);
                settings.source = Some(channel);
                message
            }
            Self::AddTarget(n) => {
                let channel = pick(dialogs, n)?;
                let title = channel.title.clone();
                if settings.add_target(channel) {
                    format!("Target added: {title}.")
                } else {
                    format!("{title} is already a target.")
                }
            }
            Self::RemoveTarget(n) => {
                let len = settings.targets.len();
                let id = n
                    .checked_sub(1)
                    .and_then(|i| settings.targets.get(i))
                    .map(|t| t.id)
                    .ok_or(SettingError::OutOfRange { index: n, len })?;
                settings.remove_target(id);
                "Target removed.".to_owned()
            }
            Self::Word {
                from,
                to,
                case_sensitive,
            } => {
                let message = format!("Replacing \"{from}\" with \"{to}\".");
                settings.word_rules.retain(|r| r.original != from);
                settings.word_rules.push(WordRule {
                    original: from,
                    replacement: to,
                    case_sensitive,
                });
                message
            }
            Self::Link { from, to } => {
                let message = format!("Replacing link {from} with {to}.");
                settings.link_rules.retain(|r| r.original != from);
                settings.link_rules.push(LinkRule {
                    original: from,
                    replacement: to,
                });
                message
            }
            Self::ClearWords => {
                settings.word_rules.clear();
                "Word rules cleared.".to_owned()
            }
            Self::ClearLinks => {
                settings.link_rules.clear();
                "Link rules cleared.".to_owned()
            }
            Self::Active(true) => {
                settings.active = true;
                if !settings.is_ready() {
                    settings.active = false;
                    return Err(SettingError::NotReady);
                }
                "Forwarding started.".to_owned()
            }
            Self::Active(false) => {
                settings.active = false;
                "Forwarding stopped.".to_owned()
            }
        };
        Ok(message)
    }
}

fn on_off(value: &str, usage: &'static str) -> Result<bool, SettingError> {
    match value.to_lowercase().as_str() {
        "on" | "yes" | "true" => Ok(true),
        "off" | "no" | "false" => Ok(false),
        _ => Err(SettingError::Usage(usage)),
    }
}

fn index(value: &str, usage: &'static str) -> Result<usize, SettingError> {
    value
        .trim()
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or(SettingError::Usage(usage))
}

fn rule(value: &str, usage: &'static str) -> Result<(String, String), SettingError> {
    let (from, to) = value.split_once("=>").ok_or(SettingError::Usage(usage))?;
    let from = from.trim();
    if from.is_empty() {
        return Err(SettingError::Usage(usage));
    }
    Ok((from.to_owned(), to.trim().to_owned()))
}

fn pick(dialogs: &[Dialog], n: usize) -> Result<ChannelRef, SettingError> {
    n.checked_sub(1)
        .and_then(|i| dialogs.get(i))
        .map(|d| ChannelRef {
            id: d.id,
            title: d.title.clone(),
        })
        .ok_or(SettingError::OutOfRange {
            index: n,
            len: dialogs.len(),
        })
}

/// The `/settings` overview.
#[must_use]
pub fn render_settings(settings: &ForwardSettings) -> String {
    let on_off = |b: bool| if b { "on" } else { "off" };
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Forwarding: {}",
        if settings.active { "running" } else { "stopped" }
    );
    let _ = writeln!(
        out,
        "Source: {}",
        settings.source.as_ref().map_or("not set", |s| s.title.as_str())
    );
    if settings.targets.is_empty() {
        let _ = writeln!(out, "Targets: none");
    } else {
        let _ = writeln!(out, "Targets:");
        for (i, target) in settings.targets.iter().enumerate() {
            let state = match (&target.last_error, target.active) {
                (_, true) => String::new(),
                (Some(error), false) => format!(" (inactive: {error})"),
                (None, false) => " (inactive)".to_owned(),
            };
            let _ = writeln!(out, "  {}. {}{}", i + 1, target.title, state);
        }
    }

    let _ = writeln!(out, "Media: {}", on_off(settings.forward_media));
    let _ = writeln!(out, "Remove links: {}", on_off(settings.remove_links));
    let _ = writeln!(out, "Remove usernames: {}", on_off(settings.remove_usernames));
    let _ = writeln!(out, "Keep link query: {}", on_off(settings.preserve_query));
    let _ = writeln!(out, "Delay: {}s", settings.delay_seconds);
    let _ = writeln!(out, "Max length: {}", settings.max_message_length);

    for rule in &settings.word_rules {
        let case = if rule.case_sensitive { " (case-sensitive)" } else { "" };
        let _ = writeln!(out, "Word: {} => {}{}", rule.original, rule.replacement, case);
    }
    for rule in &settings.link_rules {
        let _ = writeln!(out, "Link: {} => {}", rule.original, rule.replacement);
    }

    let _ = write!(
        out,
        "Forwarded: {}, failed: {}",
        settings.stats.forwarded, settings.stats.failed
    );
    if let Some(at) = settings.stats.last_forward_at {
        let _ = write!(out, ", last at {}", at.format("%Y-%m-%d %H:%M UTC"));
    }
    out
}

/// The `/dashboard` view: status plus the numbered dialog list used by
/// `source <n>` and `target add <n>`.
#[must_use]
pub fn render_dashboard(settings: &ForwardSettings, dialogs: &[Dialog]) -> String {
    let mut out = render_settings(settings);
    out.push_str("\n\nYour chats:\n");
    if dialogs.is_empty() {
        out.push_str("  (none)");
    }
    for (i, dialog) in dialogs.iter().enumerate() {
        let kind = if dialog.is_channel { "channel" } else { "chat" };
        let _ = writeln!(out, "  {}. {} [{}]", i + 1, dialog.title, kind);
    }
    out.trim_end().to_owned()
}

pub const HELP_TEXT: &str = "\
Auto-forward bot

/login +15551234567 - log in with your Telegram account
/code 12345 or AUTOX12345 - enter the login code
/password <password> - two-step verification password
/dashboard - status and your numbered chats
/settings - show settings
/settings source <n> - forward from chat n
/settings target add|remove <n> - manage targets
/settings media|links|usernames|query on|off
/settings delay <seconds>
/settings maxlen <n> (0 = no limit)
/settings word <from> => <to>
/settings wordcase <from> => <to>
/settings link <from> => <to>
/settings clear words|links
/settings start|stop
/logout - log out and forget the session";

#[cfg(test)]
mod tests {
    use super::*;

    fn dialogs() -> Vec<Dialog> {
        vec![
            Dialog {
                id: -1001,
                title: "News".to_owned(),
                is_channel: true,
            },
            Dialog {
                id: -1002,
                title: "Mirror".to_owned(),
                is_channel: true,
            },
        ]
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ForwardCommand::parse("/start"), Some(ForwardCommand::Start));
        assert_eq!(
            ForwardCommand::parse("/login +15551234567"),
            Some(ForwardCommand::Login(Some("+15551234567".to_owned())))
        );
        assert_eq!(ForwardCommand::parse("/LOGIN@my_bot"), Some(ForwardCommand::Login(None)));
        assert_eq!(
            ForwardCommand::parse("AUTOX 12-345"),
            Some(ForwardCommand::Code(Some("12345".to_owned())))
        );
        assert_eq!(ForwardCommand::parse("/code abc"), Some(ForwardCommand::Code(None)));
        assert_eq!(
            ForwardCommand::parse("/settings delay 5"),
            Some(ForwardCommand::Settings(Some("delay 5".to_owned())))
        );
        assert_eq!(ForwardCommand::parse("hello"), None);
        assert_eq!(ForwardCommand::parse("/unknown"), None);
    }

    #[test]
    fn test_parse_setting_changes() {
        assert_eq!(
            SettingChange::parse("media off"),
            Ok(SettingChange::Toggle(Toggle::Media, false))
        );
        assert_eq!(SettingChange::parse("delay 3"), Ok(SettingChange::Delay(3)));
        assert_eq!(
            SettingChange::parse("target remove 2"),
            Ok(SettingChange::RemoveTarget(2))
        );
        assert_eq!(
            SettingChange::parse("wordcase Crypto => Finance"),
            Ok(SettingChange::Word {
                from: "Crypto".to_owned(),
                to: "Finance".to_owned(),
                case_sensitive: true,
            })
        );
        assert_eq!(
            SettingChange::parse("link https://a.b =>"),
            Ok(SettingChange::Link {
                from: "https://a.b".to_owned(),
                to: String::new(),
            })
        );
        assert_eq!(
            SettingChange::parse("media maybe"),
            Err(SettingError::Usage("media on|off"))
        );
        assert_eq!(
            SettingChange::parse("source 0"),
            Err(SettingError::Usage("source <n>"))
        );
        assert!(matches!(
            SettingChange::parse("colour red"),
            Err(SettingError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_apply_source_targets_and_start() {
        let dialogs = dialogs();
        let mut settings = ForwardSettings::default();

        assert_eq!(
            SettingChange::Active(true).apply(&mut settings, &dialogs),
            Err(SettingError::NotReady)
        );
        assert!(!settings.active);

        SettingChange::Source(1).apply(&mut settings, &dialogs).unwrap();
        SettingChange::AddTarget(2).apply(&mut settings, &dialogs).unwrap();
        assert_eq!(
            SettingChange::AddTarget(3).apply(&mut settings, &dialogs),
            Err(SettingError::OutOfRange { index: 3, len: 2 })
        );
        SettingChange::Active(true).apply(&mut settings, &dialogs).unwrap();
        assert!(settings.is_ready());

        SettingChange::RemoveTarget(1).apply(&mut settings, &dialogs).unwrap();
        assert!(settings.targets.is_empty());
    }

    #[test]
    fn test_word_rule_replaces_same_original() {
        let mut settings = ForwardSettings::default();
        SettingChange::parse("word a => b")
            .unwrap()
            .apply(&mut settings, &[])
            .unwrap();
        SettingChange::parse("word a => c")
            .unwrap()
            .apply(&mut settings, &[])
            .unwrap();
        assert_eq!(settings.word_rules.len(), 1);
        assert_eq!(settings.word_rules[0].replacement, "c");

        SettingChange::ClearWords.apply(&mut settings, &[]).unwrap();
        assert!(settings.word_rules.is_empty());
    }

    #[test]
    fn test_render_dashboard_numbers_dialogs() {
        let settings = ForwardSettings::default();
        let text = render_dashboard(&settings, &dialogs());
        assert!(text.contains("Forwarding: stopped"));
        assert!(text.contains("1. News [channel]"));
        assert!(text.contains("2. Mirror [channel]"));
    }
}
