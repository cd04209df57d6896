//! Deterministic, pure logic shared by the rundoc engine.
//!
//! Core modules are free of I/O side effects: no process spawning, no
//! filesystem, no reads of the ambient environment. Lookups they need are
//! injected by the caller.

pub mod fence;
pub mod placeholder;
pub mod record;
pub mod tags;
