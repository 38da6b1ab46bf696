use std::sync::LazyLock;

use regex::Regex;

/// Anything that is neither printable ASCII nor in the Hebrew block.
static RE_DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\x20-\x7E\x{0590}-\x{05FF}]").unwrap());
/// Zero-width and bidi control code points.
static RE_INVISIBLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{200B}-\x{200F}\x{202A}-\x{202E}]").unwrap());
static RE_UNDERSCORE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());
static RE_WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

const MIN_MEANINGFUL_CHARS: usize = 3;

/// Normalize raw OCR output.
///
/// Line breaks and tabs become spaces first so words on adjacent lines stay
/// apart. Characters outside printable ASCII and Hebrew are removed, runs of
/// two or more underscores are deleted, whitespace runs collapse to a single
/// space, and the result is trimmed. Fewer than three remaining characters
/// count as no text at all. Applying the function twice changes nothing.
pub fn clean_text(raw: &str) -> String {
    let spaced: String = raw
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let text = RE_DISALLOWED.replace_all(&spaced, "");
    let text = RE_INVISIBLE.replace_all(&text, "");
    let text = RE_UNDERSCORE_RUN.replace_all(&text, "");
    let text = RE_WHITESPACE_RUN.replace_all(&text, " ");
    let text = text.trim();

    if text.chars().count() < MIN_MEANINGFUL_CHARS {
        return String::new();
    }
    text.to_string()
}
