//! Session record persistence (JSON on disk, schema-validated on load).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::core::record::SessionRecord;
use crate::io::atomic::write_atomic;

const SESSION_RECORD_SCHEMA: &str = include_str!("../../schemas/session_record.schema.json");

/// Destination for session snapshots produced during a run.
pub trait RecordSink {
    fn persist(&mut self, record: &SessionRecord) -> Result<()>;
}

/// Writes the record as pretty JSON to a file, replacing it atomically.
#[derive(Debug, Clone)]
pub struct FileRecordSink {
    path: PathBuf,
}

impl FileRecordSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for FileRecordSink {
    fn persist(&mut self, record: &SessionRecord) -> Result<()> {
        write_record(&self.path, record)
    }
}

/// Atomically write `record` to `path` (temp file + rename).
pub fn write_record(path: &Path, record: &SessionRecord) -> Result<()> {
    debug!(path = %path.display(), blocks = record.code_blocks.len(), "writing session record");
    let mut buf = serde_json::to_string_pretty(record).context("serialize session record")?;
    buf.push('\n');
    write_atomic(path, &buf).with_context(|| format!("write record {}", path.display()))
}

/// Load a session record, validating it against the bundled schema first.
pub fn load_record(path: &Path) -> Result<SessionRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read record {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse record {}", path.display()))?;
    validate_schema(&value).with_context(|| format!("validate record {}", path.display()))?;
    let record: SessionRecord = serde_json::from_value(value)
        .with_context(|| format!("deserialize record {}", path.display()))?;
    debug!(path = %path.display(), blocks = record.code_blocks.len(), "session record loaded");
    Ok(record)
}

fn validate_schema(record: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(SESSION_RECORD_SCHEMA).context("parse bundled record schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(record) {
        let messages = compiled
            .iter_errors(record)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "record schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{BlockRecord, RunAttempt};
    use crate::test_support::record_with;

    #[test]
    fn sink_writes_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("out.json");
        let mut run = RunAttempt::new();
        run.user_code = "ls -al".to_string();
        run.output = "total 0\n".to_string();
        run.retcode = Some(0);
        run.time_start = Some(1_690_000_000.123);
        run.time_stop = Some(1_690_000_000.456);
        let record = record_with(&[("a", "b")], vec![BlockRecord {
            code: "ls\n".to_string(),
            interpreter: "bash".to_string(),
            runs: vec![run],
            tags: vec!["bash".to_string(), "test1".to_string()],
        }]);

        let mut sink = FileRecordSink::new(&path);
        sink.persist(&record).expect("persist");
        assert!(!path.with_extension("json.tmp").exists());
        let written = fs::read_to_string(&path).expect("read");
        assert!(written.ends_with("}\n"));

        let loaded = load_record(&path).expect("load");
        assert_eq!(loaded, record);
    }

    #[test]
    fn unfinished_runs_validate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out.json");
        let record = record_with(&[], vec![BlockRecord {
            code: "sleep 1\n".to_string(),
            interpreter: "bash".to_string(),
            runs: vec![RunAttempt::new()],
            tags: vec!["bash".to_string()],
        }]);
        write_record(&path, &record).expect("write");
        assert_eq!(load_record(&path).expect("load"), record);
    }

    #[test]
    fn schema_rejects_blocks_without_tags() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bad.json");
        fs::write(
            &path,
            r#"{"env":{},"code_blocks":[{"code":"ls","interpreter":"bash","runs":[],"tags":[]}]}"#,
        )
        .expect("write");
        let err = load_record(&path).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn env_values_must_be_strings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bad.json");
        fs::write(&path, r#"{"env":{"a":1},"code_blocks":[]}"#).expect("write");
        assert!(load_record(&path).is_err());
    }
}
