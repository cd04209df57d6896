//! Typed domain failures.
//!
//! Everything else travels as `anyhow::Error`; these variants are the ones
//! callers branch on (via `downcast_ref`) to pick an exit code or a stop reason.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RundocError {
    /// A `key=value` declaration line could not be parsed.
    #[error("Bad environment line: {line}")]
    BadEnv { line: String },

    /// The first tag names neither a built-in action nor an executable on `PATH`.
    #[error("Bad interpreter: '{interpreter}'")]
    BadInterpreter { interpreter: String },

    /// A block used up its retry budget without exiting 0.
    #[error("Failed at step {step} with exit code '{}'", display_code(.exit_code))]
    CodeFailed { step: usize, exit_code: Option<i32> },

    /// The run was stopped by a keyboard interrupt.
    #[error("Quit at step {step} with keyboard interrupt.")]
    Interrupted { step: usize },

    /// A block was handed to the commander without any tag.
    #[error("code block has no tags")]
    MissingTags,
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "None".to_string(),
    }
}
