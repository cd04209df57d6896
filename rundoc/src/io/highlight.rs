//! Terminal syntax highlighting for code shown before it runs.

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::{LinesWithEndings, as_24_bit_terminal_escaped};

const DARK_THEME: &str = "base16-ocean.dark";
const LIGHT_THEME: &str = "InspiredGitHub";
const RESET: &str = "\x1b[0m";

pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
    enabled: bool,
}

impl Highlighter {
    /// Highlighter for the current terminal; disabled when stdout is not a tty.
    pub fn new(light: bool) -> Self {
        let enabled = console::Term::stdout().is_term();
        Self::with_theme(light, enabled)
    }

    /// Highlighter that returns code unchanged.
    pub fn plain() -> Self {
        Self::with_theme(false, false)
    }

    fn with_theme(light: bool, enabled: bool) -> Self {
        let name = if light { LIGHT_THEME } else { DARK_THEME };
        let theme = ThemeSet::load_defaults()
            .themes
            .remove(name)
            .unwrap_or_default();
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Highlight `code` for the interpreter/language `language`.
    ///
    /// Unknown languages render as plain text.
    pub fn highlight(&self, code: &str, language: &str) -> String {
        if !self.enabled {
            return code.to_string();
        }
        let syntax = self.find_syntax(language);
        let mut lines = HighlightLines::new(syntax, &self.theme);
        let mut out = String::with_capacity(code.len() * 2);
        for line in LinesWithEndings::from(code) {
            match lines.highlight_line(line, &self.syntax_set) {
                Ok(ranges) => out.push_str(&as_24_bit_terminal_escaped(&ranges[..], false)),
                Err(_) => out.push_str(line),
            }
        }
        out.push_str(RESET);
        out
    }

    fn find_syntax(&self, language: &str) -> &SyntaxReference {
        // `python3` and `ruby2.7` should pick up `python` and `ruby`.
        let base = language.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        self.syntax_set
            .find_syntax_by_token(language)
            .or_else(|| self.syntax_set.find_syntax_by_token(base))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_highlighter_returns_code_verbatim() {
        let highlighter = Highlighter::plain();
        assert_eq!(highlighter.highlight("ls -al\n", "bash"), "ls -al\n");
    }

    #[test]
    fn enabled_highlighter_emits_escapes_and_keeps_text() {
        let highlighter = Highlighter::with_theme(false, true);
        let rendered = highlighter.highlight("echo hi\n", "bash");
        assert!(rendered.contains("\x1b["));
        assert!(rendered.ends_with(RESET));
        assert!(console::strip_ansi_codes(&rendered).contains("echo hi"));
    }

    #[test]
    fn versioned_interpreters_fall_back_to_base_syntax() {
        let highlighter = Highlighter::with_theme(true, true);
        assert_eq!(highlighter.find_syntax("python3").name, "Python");
        assert_eq!(
            highlighter.find_syntax("no-such-lang").name,
            highlighter.syntax_set.find_syntax_plain_text().name
        );
    }
}
