//! Stable exit codes for the rundoc CLI.

/// All selected blocks ran (or a `usage` block asked to stop).
pub const OK: i32 = 0;
/// Invalid input: unreadable document, bad environment, bad interpreter, bad record.
pub const INVALID: i32 = 1;
/// A block exhausted its retries with a non-zero exit code.
pub const CODE_FAILED: i32 = 2;
/// The run was stopped with Ctrl-C.
pub const INTERRUPTED: i32 = 130;
