//! A single runnable code block and its run history.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::core::record::{BlockRecord, RunAttempt};
use crate::core::tags::tag_name;
use crate::error::RundocError;
use crate::io::actions::{self, ActionOutcome, ActionSpec};
use crate::io::interrupt::Interrupt;
use crate::io::process::run_streaming;
use crate::io::prompt::Prompter;

/// How a block executes, resolved once from its first tag.
#[derive(Debug)]
pub enum BlockKind {
    /// External interpreter fed the code on stdin.
    Interpreter { name: String, program: PathBuf },
    /// Built-in in-process action.
    Action {
        spec: &'static ActionSpec,
        args: Vec<String>,
    },
}

impl BlockKind {
    /// Resolve a first tag to an action or an interpreter on `PATH`.
    pub fn resolve(first_tag: &str) -> Result<Self> {
        let (name, args) = actions::split_action_tag(first_tag);
        if let Some(spec) = actions::lookup(name) {
            return Ok(Self::Action { spec, args });
        }
        match which::which(first_tag) {
            Ok(program) => Ok(Self::Interpreter {
                name: first_tag.to_string(),
                program,
            }),
            Err(e) => {
                debug!(interpreter = first_tag, err = %e, "interpreter not found");
                Err(RundocError::BadInterpreter {
                    interpreter: first_tag.to_string(),
                }
                .into())
            }
        }
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Exited(i32),
    /// Stopped by the interrupt flag.
    Interrupted,
    /// An action asked for the whole program to stop.
    Terminate,
}

#[derive(Debug)]
pub struct Block {
    code: String,
    tags: Vec<String>,
    kind: BlockKind,
    runs: Vec<RunAttempt>,
}

impl Block {
    /// Build a block, checking that its first tag names an action or an
    /// interpreter that can be launched.
    pub fn new(code: impl Into<String>, tags: Vec<String>) -> Result<Self> {
        let first = tags.first().ok_or(RundocError::MissingTags)?;
        let kind = BlockKind::resolve(first)?;
        Ok(Self {
            code: code.into(),
            tags,
            kind,
            runs: Vec::new(),
        })
    }

    /// Rebuild a block from a persisted record. The last attempt's code
    /// becomes the new base code.
    pub fn from_record(record: &BlockRecord) -> Result<Self> {
        Self::new(record.replay_code(), record.tags.clone())
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    pub fn runs(&self) -> &[RunAttempt] {
        &self.runs
    }

    pub fn last_run(&self) -> Option<&RunAttempt> {
        self.runs.last()
    }

    pub fn is_action(&self) -> bool {
        matches!(self.kind, BlockKind::Action { .. })
    }

    /// The full first tag, including action arguments.
    pub fn interpreter(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or_default()
    }

    /// Language hint for highlighting and editing.
    pub fn language(&self) -> &str {
        tag_name(self.interpreter())
    }

    /// Code that the next attempt starts from: the previous attempt's edit,
    /// or the base code.
    pub fn current_code(&self) -> &str {
        match self.runs.last() {
            Some(run) if !run.user_code.is_empty() => &run.user_code,
            _ => &self.code,
        }
    }

    pub fn to_record(&self) -> BlockRecord {
        BlockRecord {
            code: self.code.clone(),
            interpreter: self.interpreter().to_string(),
            runs: self.runs.clone(),
            tags: self.tags.clone(),
        }
    }

    /// Run one attempt and append it to the history.
    ///
    /// With a prompter the user reviews the code first; without one the base
    /// code runs as is. A prompt that fails while `interrupt` is raised ends
    /// the attempt as [`AttemptOutcome::Interrupted`] without recording it.
    #[instrument(skip_all, fields(interpreter = self.interpreter(), attempt = self.runs.len() + 1))]
    pub fn run(
        &mut self,
        prompter: Option<&dyn Prompter>,
        interrupt: &Interrupt,
    ) -> Result<AttemptOutcome> {
        let user_code = match prompter {
            Some(prompter) => match prompter.edit(self.current_code(), self.language()) {
                Ok(code) => code,
                // Ctrl-C at the prompt: nothing ran, so no attempt is recorded.
                Err(err) if interrupt.is_triggered() => {
                    debug!(err = %format!("{err:#}"), "prompt ended by interrupt");
                    return Ok(AttemptOutcome::Interrupted);
                }
                Err(err) => return Err(err),
            },
            None => self.code.clone(),
        };
        self.runs.push(RunAttempt {
            user_code,
            ..RunAttempt::new()
        });
        let index = self.runs.len() - 1;

        if interrupt.is_triggered() {
            self.runs[index].time_stop = Some(now_secs());
            return Ok(AttemptOutcome::Interrupted);
        }

        let code = self.runs[index].user_code.trim().to_string();
        self.runs[index].time_start = Some(now_secs());
        let outcome = match &self.kind {
            BlockKind::Action { spec, args } => {
                let attempt = &mut self.runs[index];
                run_action(spec, args, &code, attempt)
            }
            BlockKind::Interpreter { program, .. } => {
                let attempt = &mut self.runs[index];
                run_interpreter(program, &code, interrupt, attempt)?
            }
        };
        self.runs[index].time_stop = Some(now_secs());
        debug!(?outcome, "attempt finished");
        Ok(outcome)
    }
}

fn run_action(
    spec: &ActionSpec,
    args: &[String],
    code: &str,
    attempt: &mut RunAttempt,
) -> AttemptOutcome {
    match spec.invoke(args, code) {
        Ok(ActionOutcome::Completed(retcode)) => {
            attempt.retcode = Some(retcode);
            AttemptOutcome::Exited(retcode)
        }
        Ok(ActionOutcome::Terminate) => {
            attempt.retcode = Some(0);
            AttemptOutcome::Terminate
        }
        Err(err) => {
            let message = format!("{err:#}\nusage: {}", spec.usage);
            warn!(action = spec.name, err = %message, "action failed");
            println!("{message}");
            attempt.output = message;
            attempt.retcode = Some(1);
            AttemptOutcome::Exited(1)
        }
    }
}

fn run_interpreter(
    program: &Path,
    code: &str,
    interrupt: &Interrupt,
    attempt: &mut RunAttempt,
) -> Result<AttemptOutcome> {
    let mut stdout = std::io::stdout();
    let outcome = run_streaming(
        Command::new(program),
        code.as_bytes(),
        interrupt,
        &mut |chunk: &str| {
            attempt.output.push_str(chunk);
            let _ = stdout.write_all(chunk.as_bytes());
            let _ = stdout.flush();
        },
    )
    .with_context(|| format!("run {}", program.display()))?;
    let retcode = outcome.exit_code();
    attempt.retcode = Some(retcode);
    if outcome.interrupted {
        Ok(AttemptOutcome::Interrupted)
    } else {
        Ok(AttemptOutcome::Exited(retcode))
    }
}

/// Seconds since the Unix epoch with microsecond precision.
fn now_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::test_support::{ScriptedPrompter, tags};

    #[test]
    fn unknown_interpreter_is_rejected() {
        let err = Block::new("x", tags(&["rundoc-no-such-interpreter"])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RundocError>(),
            Some(&RundocError::BadInterpreter {
                interpreter: "rundoc-no-such-interpreter".to_string()
            })
        );
    }

    #[test]
    fn empty_tags_are_rejected() {
        let err = Block::new("x", Vec::new()).unwrap_err();
        assert_eq!(err.downcast_ref::<RundocError>(), Some(&RundocError::MissingTags));
    }

    #[test]
    fn actions_are_recognized_by_name() {
        let block = Block::new("hello", tags(&["create-file:/tmp/x:600", "setup"])).expect("block");
        assert!(block.is_action());
        assert_eq!(block.language(), "create-file");
        match block.kind() {
            BlockKind::Action { spec, args } => {
                assert_eq!(spec.name, "create-file");
                assert_eq!(args, &vec!["/tmp/x".to_string(), "600".to_string()]);
            }
            other => panic!("expected action, got {other:?}"),
        }
        let block = Block::new("ls", tags(&["bash"])).expect("block");
        assert!(!block.is_action());
    }

    #[test]
    fn successful_run_records_output_and_timestamps() {
        let mut block = Block::new("echo hello\n", tags(&["bash", "test"])).expect("block");
        let outcome = block.run(None, &Interrupt::new()).expect("run");
        assert_eq!(outcome, AttemptOutcome::Exited(0));
        let run = block.last_run().expect("attempt");
        assert_eq!(run.user_code, "echo hello\n");
        assert_eq!(run.output, "hello\n");
        assert_eq!(run.retcode, Some(0));
        let (start, stop) = (run.time_start.expect("start"), run.time_stop.expect("stop"));
        assert!(start > 1_600_000_000.0 && stop >= start);
    }

    #[test]
    fn failing_runs_append_history() {
        let mut block = Block::new("cat /nonexistent", tags(&["bash"])).expect("block");
        for _ in 0..2 {
            let outcome = block.run(None, &Interrupt::new()).expect("run");
            assert!(matches!(outcome, AttemptOutcome::Exited(code) if code != 0));
        }
        assert_eq!(block.runs().len(), 2);
        assert!(block.runs().iter().all(|run| run.retcode.is_some_and(|c| c != 0)));
    }

    #[test]
    fn prompted_edit_becomes_attempt_code() {
        let prompter = ScriptedPrompter::new()
            .with_edit("echo edited")
            .with_edit("echo again");
        let mut block = Block::new("echo base", tags(&["bash"])).expect("block");
        block.run(Some(&prompter), &Interrupt::new()).expect("run");
        block.run(Some(&prompter), &Interrupt::new()).expect("run");
        assert_eq!(
            prompter.shown(),
            vec!["echo base".to_string(), "echo edited".to_string()]
        );
        assert_eq!(block.runs()[1].output, "again\n");
        assert_eq!(block.to_record().replay_code(), "echo again");
    }

    #[test]
    fn action_errors_become_output_with_exit_one() {
        let mut block =
            Block::new("x", tags(&["create-file:/nonexistent-dir/rundoc/x"])).expect("block");
        let outcome = block.run(None, &Interrupt::new()).expect("run");
        assert_eq!(outcome, AttemptOutcome::Exited(1));
        let run = block.last_run().expect("attempt");
        assert_eq!(run.retcode, Some(1));
        assert!(run.output.contains("/nonexistent-dir/rundoc/x"));
    }

    #[test]
    fn usage_action_requests_termination() {
        let mut block = Block::new("help", tags(&["usage"])).expect("block");
        assert_eq!(
            block.run(None, &Interrupt::new()).expect("run"),
            AttemptOutcome::Terminate
        );
    }

    #[test]
    fn interrupt_stops_the_running_attempt() {
        let interrupt = Interrupt::new();
        let trigger = interrupt.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            trigger.trigger();
        });
        let mut block = Block::new("exec sleep 30", tags(&["bash"])).expect("block");
        let outcome = block.run(None, &interrupt).expect("run");
        handle.join().expect("join");
        assert_eq!(outcome, AttemptOutcome::Interrupted);
        let run = block.last_run().expect("attempt");
        assert_eq!(run.retcode, Some(-9));
        assert!(run.is_finished());
    }

    #[test]
    fn record_round_trip_keeps_interpreter_and_tags() {
        let mut block = Block::new("echo hi", tags(&["bash", "t1"])).expect("block");
        block.run(None, &Interrupt::new()).expect("run");
        let record = block.to_record();
        assert_eq!(record.interpreter, "bash");
        let replayed = Block::from_record(&record).expect("replay");
        assert_eq!(replayed.code(), "echo hi");
        assert_eq!(replayed.tags(), block.tags());
        assert!(replayed.runs().is_empty());
    }

    struct FailingPrompter<'a> {
        interrupt: &'a Interrupt,
    }

    impl Prompter for FailingPrompter<'_> {
        fn edit(&self, _default: &str, _language: &str) -> Result<String> {
            self.interrupt.trigger();
            anyhow::bail!("read confirmation: read interrupted")
        }

        fn acknowledge(&self, _message: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn prompt_failing_under_interrupt_is_an_interrupted_attempt() {
        let interrupt = Interrupt::new();
        let prompter = FailingPrompter {
            interrupt: &interrupt,
        };
        let mut block = Block::new("touch never", tags(&["bash"])).expect("block");
        let outcome = block.run(Some(&prompter), &interrupt).expect("run");
        assert_eq!(outcome, AttemptOutcome::Interrupted);
        assert!(block.runs().is_empty());
    }
}
