//! Test-only helpers: a scripted prompter, an in-memory record sink and
//! small builders.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::record::{BlockRecord, OrderedVars, SessionRecord};
use crate::io::prompt::Prompter;
use crate::io::record_store::RecordSink;

/// Prompter that answers from a queue and records what it was shown.
///
/// When the queue is empty, edits accept the default unchanged.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    edits: RefCell<VecDeque<String>>,
    shown: RefCell<Vec<String>>,
    acknowledged: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the text returned by the next unanswered edit.
    pub fn with_edit(self, text: &str) -> Self {
        self.edits.borrow_mut().push_back(text.to_string());
        self
    }

    /// Defaults passed to every edit so far.
    pub fn shown(&self) -> Vec<String> {
        self.shown.borrow().clone()
    }

    /// Messages passed to every acknowledgement so far.
    pub fn acknowledged(&self) -> Vec<String> {
        self.acknowledged.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn edit(&self, default: &str, _language: &str) -> Result<String> {
        self.shown.borrow_mut().push(default.to_string());
        Ok(self
            .edits
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| default.to_string()))
    }

    fn acknowledge(&self, message: &str) -> Result<()> {
        self.acknowledged.borrow_mut().push(message.to_string());
        Ok(())
    }
}

/// Sink that keeps every persisted record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<SessionRecord>,
}

impl RecordSink for MemorySink {
    fn persist(&mut self, record: &SessionRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Owned tag list from string slices.
pub fn tags(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|tag| tag.to_string()).collect()
}

/// Session record with the given env pairs and blocks.
pub fn record_with(env: &[(&str, &str)], code_blocks: Vec<BlockRecord>) -> SessionRecord {
    SessionRecord {
        code_blocks,
        env: env.iter().copied().collect::<OrderedVars>(),
    }
}

/// Write `contents` to `name` inside `dir` and return the path.
pub fn write_doc(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write test document");
    path
}
