//! Run fenced code blocks from markdown documents, one step at a time.
//!
//! A document's fenced blocks are tagged from their info strings
//! (` ```bash#setup `), selected with a tag filter and executed in order by a
//! [`commander::Commander`]. Every attempt is recorded so a session can be
//! written out and replayed later.
//!
//! - **[`core`]**: pure logic (tag selection, placeholders, fence scanning,
//!   record types). No I/O.
//! - **[`io`]**: side effects (processes, files, prompts, the process
//!   environment, Ctrl-C).
//!
//! [`block`], [`commander`] and [`document`] tie the two together.

pub mod block;
pub mod commander;
pub mod core;
pub mod document;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
