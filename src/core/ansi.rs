//! ANSI escape stripping
//!
//! Output surfaces are plain text, so colour and cursor sequences written by
//! commands are removed before the text is inserted.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Get the compiled escape sequence regex
fn escape_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        // CSI sequences (ESC [ ... final byte) and OSC sequences (ESC ] ... BEL or ST)
        Regex::new(r"\x1B\[[0-?]*[ -/]*[@-~]|\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)|\x1B[@-Z\\-_]")
            .expect("Invalid escape regex")
    })
}

/// Remove escape sequences from `text` if stripping is enabled
///
/// Borrows when there is nothing to strip.
pub fn strip_ansi(text: &str, is_enabled: bool) -> std::borrow::Cow<'_, str> {
    if !is_enabled || !text.contains('\x1B') {
        return std::borrow::Cow::Borrowed(text);
    }
    escape_regex().replace_all(text, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_untouched() {
        let out = strip_ansi("hello world\n", true);
        assert!(matches!(out, std::borrow::Cow::Borrowed(_)));
        assert_eq!(out, "hello world\n");
    }

    #[test]
    fn test_colour_codes_removed() {
        let text = "\x1B[1;31merror\x1B[0m: bad thing\n";
        assert_eq!(strip_ansi(text, true), "error: bad thing\n");
    }

    #[test]
    fn test_osc_title_removed() {
        let text = "\x1B]0;my title\x07done";
        assert_eq!(strip_ansi(text, true), "done");
    }

    #[test]
    fn test_disabled_keeps_escapes() {
        let text = "\x1B[32mok\x1B[0m";
        assert_eq!(strip_ansi(text, false), text);
    }
}
