//! I/O for rundoc: processes, files, prompts and the process environment.

pub mod actions;
pub mod atomic;
pub mod config;
pub mod env_table;
pub mod highlight;
pub mod interrupt;
pub mod process;
pub mod prompt;
pub mod record_store;
