//! Interactive prompting.
//!
//! The [`Prompter`] trait decouples the run loop from the terminal. The
//! binary uses [`TerminalPrompter`]; tests use a scripted prompter that
//! returns canned answers without touching stdin.

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Editor, Input};
use tracing::debug;

use crate::io::highlight::Highlighter;

/// Source of interactive decisions.
pub trait Prompter {
    /// Show `default` for review and return the text the user accepts.
    ///
    /// `language` is the interpreter name (or `env` for variable tables) and
    /// only affects presentation.
    fn edit(&self, default: &str, language: &str) -> Result<String>;

    /// Print `message` and block until the user presses Return.
    fn acknowledge(&self, message: &str) -> Result<()>;
}

/// Terminal prompter: highlighted preview, Return to accept, `e` to open `$EDITOR`.
pub struct TerminalPrompter {
    highlighter: Highlighter,
}

impl TerminalPrompter {
    pub fn new(light: bool) -> Self {
        Self {
            highlighter: Highlighter::new(light),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn edit(&self, default: &str, language: &str) -> Result<String> {
        let mut current = default.to_string();
        loop {
            println!("{}", self.highlighter.highlight(current.trim_end(), language));
            let answer: String = Input::new()
                .with_prompt(format!(
                    "{} run/accept, {} edit",
                    style("[Return]").bold(),
                    style("[e]").bold()
                ))
                .allow_empty(true)
                .interact_text()
                .context("read confirmation")?;
            match answer.trim() {
                "" => return Ok(current),
                "e" | "edit" => {
                    let edited = Editor::new()
                        .extension(editor_extension(language))
                        .require_save(true)
                        .edit(&current)
                        .context("open editor")?;
                    match edited {
                        Some(text) => current = text,
                        None => debug!("editor closed without saving"),
                    }
                }
                other => println!("{} unknown answer '{other}'", style("!").yellow()),
            }
        }
    }

    fn acknowledge(&self, message: &str) -> Result<()> {
        println!("{message}");
        let _: String = Input::new()
            .with_prompt("Press Return")
            .allow_empty(true)
            .interact_text()
            .context("read confirmation")?;
        Ok(())
    }
}

/// Temp file extension for `$EDITOR` so editors pick a sensible mode.
fn editor_extension(language: &str) -> &'static str {
    match language {
        "bash" | "sh" | "zsh" | "dash" | "ksh" => ".sh",
        "env" => ".env",
        "fish" => ".fish",
        "perl" => ".pl",
        "ruby" => ".rb",
        "node" | "nodejs" => ".js",
        lang if lang.starts_with("python") => ".py",
        _ => ".txt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_extension_follows_interpreter() {
        assert_eq!(editor_extension("bash"), ".sh");
        assert_eq!(editor_extension("python3"), ".py");
        assert_eq!(editor_extension("env"), ".env");
        assert_eq!(editor_extension("cd"), ".txt");
    }
}
