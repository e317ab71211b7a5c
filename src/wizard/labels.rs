//! Button labels and the main menu.

use super::Mode;
use crate::telegram::{Keyboard, OutgoingMessage};

pub const MENU: &str = "🏠 Menu";
pub const BACK: &str = "⬅️ Back";
pub const ADD_PUBLISHER: &str = "➕ Add New Publisher";
pub const PREV_PAGE: &str = "◀️ Prev";
pub const NEXT_PAGE: &str = "Next ▶️";
pub const CONFIRM_YES: &str = "✅ Yes, delete";
pub const CONFIRM_NO: &str = "❌ No";
pub const DONE: &str = "/done";

/// Files listed per page while browsing.
pub const PAGE_SIZE: usize = 10;

/// Longest name accepted for a new publisher, folder or subject.
pub const MAX_NAME_CHARS: usize = 64;

/// Navigation handled before any step logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nav {
    Menu,
    Back,
}

impl Nav {
    /// Recognises `Menu` and `Back`, with or without their emoji.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let word = strip_decoration(text);
        if word.eq_ignore_ascii_case("menu") {
            Some(Self::Menu)
        } else if word.eq_ignore_ascii_case("back") {
            Some(Self::Back)
        } else {
            None
        }
    }
}

/// Whether `text` is `label`, typed with or without its emoji.
#[must_use]
pub fn is_label(text: &str, label: &str) -> bool {
    let text = text.trim();
    text == label || strip_decoration(text).eq_ignore_ascii_case(strip_decoration(label))
}

#[must_use]
pub fn is_yes(text: &str) -> bool {
    is_label(text, CONFIRM_YES) || strip_decoration(text).eq_ignore_ascii_case("yes")
}

#[must_use]
pub fn is_no(text: &str) -> bool {
    is_label(text, CONFIRM_NO)
}

/// Whether `name` may become a new catalog node.
#[must_use]
pub fn is_valid_new_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && !name.starts_with('/')
        && name.chars().count() <= MAX_NAME_CHARS
        && Nav::parse(name).is_none()
        && !is_label(name, ADD_PUBLISHER)
}

/// The main menu; admins also see the management actions.
#[must_use]
pub fn main_menu(is_admin: bool, text: impl Into<String>) -> OutgoingMessage {
    let mut keyboard = Keyboard::default().row(&[Mode::Browse.label()]);
    if is_admin {
        let admin: Vec<&str> = Mode::ALL
            .iter()
            .filter(|m| m.is_admin_only())
            .map(|m| m.label())
            .collect();
        for pair in admin.chunks(2) {
            keyboard = keyboard.row(pair);
        }
    }
    OutgoingMessage::with_keyboard(text, keyboard)
}

/// Navigation row appended under every wizard keyboard.
#[must_use]
pub fn nav_row(with_back: bool) -> Vec<&'static str> {
    if with_back { vec![BACK, MENU] } else { vec![MENU] }
}

fn strip_decoration(text: &str) -> &str {
    text.trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches(|c: char| !c.is_alphanumeric())
        .trim()
}
