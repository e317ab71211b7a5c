//! Text rewriting applied to every forwarded message.
//!
//! Steps, in order:
//! 1. Word rules, case-insensitive unless the rule says otherwise
//! 2. Link rules as plain substring replacement, optionally keeping the
//!    original query string
//! 3. Username removal
//! 4. Link removal
//! 5. Truncation with an ellipsis
//!
//! The function is pure. With empty rule tables and every flag off it
//! returns its input unchanged.

use lazy_regex::{Lazy, lazy_regex};
use regex::{NoExpand, Regex, RegexBuilder};
use tracing::debug;

use super::settings::{ForwardSettings, LinkRule, WordRule};

static URL: Lazy<Regex> = lazy_regex!(r"https?://\S+");
static USERNAME: Lazy<Regex> = lazy_regex!(r"@[A-Za-z0-9_]+");

const ELLIPSIS: &str = "...";

/// Rewrites `text` according to `settings`.
#[must_use]
pub fn transform(text: &str, settings: &ForwardSettings) -> String {
    let mut out = settings
        .word_rules
        .iter()
        .fold(text.to_owned(), |acc, rule| apply_word_rule(&acc, rule));

    if !settings.link_rules.is_empty() {
        out = apply_link_rules(&out, &settings.link_rules, settings.preserve_query);
    }

    if settings.remove_usernames {
        out = USERNAME.replace_all(&out, "").into_owned();
    }
    if settings.remove_links {
        out = URL.replace_all(&out, "").into_owned();
    }
    if settings.remove_usernames || settings.remove_links {
        out = collapse_whitespace(&out);
    }

    truncate(out, settings.max_message_length)
}

fn apply_word_rule(text: &str, rule: &WordRule) -> String {
    if rule.original.is_empty() {
        return text.to_owned();
    }

    match RegexBuilder::new(&regex::escape(&rule.original))
        .case_insensitive(!rule.case_sensitive)
        .build()
    {
        Ok(re) => re
            .replace_all(text, NoExpand(&rule.replacement))
            .into_owned(),
        Err(e) => {
            debug!("Word rule '{}' falls back to exact match: {}", rule.original, e);
            text.replace(&rule.original, &rule.replacement)
        }
    }
}

fn apply_link_rules(text: &str, rules: &[LinkRule], preserve_query: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for link in URL.find_iter(text) {
        out.push_str(&replace_plain(&text[last..link.start()], rules));
        out.push_str(&rewrite_link(link.as_str(), rules, preserve_query));
        last = link.end();
    }
    out.push_str(&replace_plain(&text[last..], rules));
    out
}

fn rewrite_link(link: &str, rules: &[LinkRule], preserve_query: bool) -> String {
    let rewritten = replace_plain(link, rules);
    if !preserve_query || rewritten == link || rewritten.contains('?') {
        return rewritten;
    }
    match link.split_once('?') {
        Some((_, query)) if !query.is_empty() => format!("{rewritten}?{query}"),
        _ => rewritten,
    }
}

fn replace_plain(text: &str, rules: &[LinkRule]) -> String {
    rules
        .iter()
        .filter(|rule| !rule.original.is_empty())
        .fold(text.to_owned(), |acc, rule| {
            acc.replace(&rule.original, &rule.replacement)
        })
}

/// Squeezes the gaps left by removed tokens: runs of spaces become one,
/// blank lines collapse to one, and the text is trimmed.
fn collapse_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let blank_run = line.is_empty() && lines.last().is_some_and(String::is_empty);
        if !blank_run {
            lines.push(line);
        }
    }
    lines.join("\n").trim().to_owned()
}

/// Cuts `text` to `max_chars` characters, ellipsis included. 0 means no
/// limit.
fn truncate(text: String, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text;
    }
    if max_chars <= ELLIPSIS.len() {
        return text.chars().take(max_chars).collect();
    }

    let mut out: String = text.chars().take(max_chars - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(original: &str, replacement: &str, case_sensitive: bool) -> WordRule {
        WordRule {
            original: original.to_owned(),
            replacement: replacement.to_owned(),
            case_sensitive,
        }
    }

    fn link(original: &str, replacement: &str) -> LinkRule {
        LinkRule {
            original: original.to_owned(),
            replacement: replacement.to_owned(),
        }
    }

    fn plain() -> ForwardSettings {
        ForwardSettings {
            max_message_length: 0,
            ..ForwardSettings::default()
        }
    }

    #[test]
    fn test_identity_with_empty_rules() {
        let settings = ForwardSettings::default();
        for text in [
            "",
            "Hello @world, see https://example.com?a=1",
            "  spaced\n\n\nlines  ",
            "Юникод и эмодзи 🎉",
        ] {
            assert_eq!(transform(text, &settings), text);
        }
    }

    #[test]
    fn test_word_rules_case() {
        let mut settings = plain();
        settings.word_rules = vec![word("Crypto", "Finance", false)];
        assert_eq!(transform("crypto CRYPTO Crypto", &settings), "Finance Finance Finance");

        settings.word_rules = vec![word("Crypto", "Finance", true)];
        assert_eq!(transform("crypto Crypto", &settings), "crypto Finance");
    }

    #[test]
    fn test_word_rules_are_literal() {
        let mut settings = plain();
        settings.word_rules = vec![word("a.b", "$1 (x)", false), word("x", "y", false)];
        assert_eq!(transform("a.b axb", &settings), "$1 (y) ayb");
    }

    #[test]
    fn test_link_rules_keep_query() {
        let mut settings = plain();
        settings.link_rules = vec![link("https://old.site/join", "https://new.site/start")];
        let text = "Join https://old.site/join?ref=42 now";

        assert_eq!(transform(text, &settings), "Join https://new.site/start?ref=42 now");

        settings.preserve_query = true;
        settings.link_rules = vec![link("https://old.site/join?ref=42", "https://new.site/start")];
        assert_eq!(transform(text, &settings), "Join https://new.site/start?ref=42 now");

        settings.preserve_query = false;
        assert_eq!(transform(text, &settings), "Join https://new.site/start now");
    }

    #[test]
    fn test_removal_collapses_whitespace() {
        let mut settings = plain();
        settings.remove_links = true;
        settings.remove_usernames = true;
        let text = "Follow @news_bot at https://t.me/news  today\n\n\n\nBye @a";
        assert_eq!(transform(text, &settings), "Follow at today\n\nBye");
    }

    #[test]
    fn test_removal_is_idempotent() {
        let mut settings = ForwardSettings::default();
        settings.remove_links = true;
        settings.remove_usernames = true;
        for text in [
            "mail me: a@b.com or https://x.io/@me?q=1 thanks",
            "@only",
            "  lots   of\n\n\n space https://a.b ",
        ] {
            let once = transform(text, &settings);
            assert_eq!(transform(&once, &settings), once, "input: {text:?}");
        }
    }

    #[test]
    fn test_truncation() {
        let mut settings = ForwardSettings::default();
        settings.max_message_length = 8;
        assert_eq!(transform("short", &settings), "short");
        assert_eq!(transform("длинный текст", &settings), "длинн...");
        assert_eq!(transform(&transform("длинный текст", &settings), &settings), "длинн...");

        settings.max_message_length = 2;
        assert_eq!(transform("abcdef", &settings), "ab");

        settings.max_message_length = 0;
        let long = "x".repeat(10_000);
        assert_eq!(transform(&long, &settings), long);
    }
}
