//! Step-by-step execution of a document's blocks.
//!
//! The commander owns the variable and secret tables and the ordered block
//! list. [`Commander::run`] walks the blocks from a starting step, prompting
//! according to the ask level and breakpoints, retrying failed steps, and
//! handing a session snapshot to the record sink when the run ends.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use console::style;
use tracing::{debug, info, instrument, warn};

use crate::block::{AttemptOutcome, Block};
use crate::core::record::SessionRecord;
use crate::core::tags::strip_selection_marker;
use crate::error::RundocError;
use crate::io::env_table::EnvironmentTable;
use crate::io::highlight::Highlighter;
use crate::io::interrupt::Interrupt;
use crate::io::prompt::Prompter;
use crate::io::record_store::RecordSink;

const PAUSE_POLL: Duration = Duration::from_millis(50);

/// Ask level at which environment tables are always shown for editing.
pub const ASK_ENV: u8 = 1;
/// Ask level at which a failed step waits for the user instead of retrying.
pub const ASK_ON_FAILURE: u8 = 2;
/// Ask level at which every step is shown for editing.
pub const ASK_EVERY_STEP: u8 = 3;

/// Run-loop parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// 1-based step to start at.
    pub step: usize,
    pub ask: u8,
    /// Steps that always prompt, whatever the ask level.
    pub breakpoints: Vec<usize>,
    /// Delay before each step that runs without a prompt.
    pub pause: Duration,
    /// Automatic retries before a failing step stops the run.
    pub retry: u32,
    pub retry_pause: Duration,
    /// Let non-empty process environment values override document values.
    pub inherit_env: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            step: 1,
            ask: ASK_ENV,
            breakpoints: Vec::new(),
            pause: Duration::ZERO,
            retry: 0,
            retry_pause: Duration::from_secs(1),
            inherit_env: false,
        }
    }
}

impl RunOptions {
    /// Whether any step is shown for review before it runs.
    pub fn reviews_code(&self) -> bool {
        self.ask >= ASK_EVERY_STEP || !self.breakpoints.is_empty()
    }
}

/// How a run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStop {
    /// Every step from the starting one succeeded.
    Completed,
    /// An action asked for the program to stop.
    Terminated,
}

pub struct Commander {
    vars: EnvironmentTable,
    secrets: EnvironmentTable,
    blocks: Vec<Block>,
    running: bool,
    /// Active 1-based step; 0 when not running.
    step: usize,
    highlighter: Highlighter,
}

impl Default for Commander {
    fn default() -> Self {
        Self::new()
    }
}

impl Commander {
    pub fn new() -> Self {
        Self::with_highlighter(Highlighter::plain())
    }

    pub fn with_highlighter(highlighter: Highlighter) -> Self {
        Self {
            vars: EnvironmentTable::new().with_title("==== env variables"),
            secrets: EnvironmentTable::new().with_title("==== secrets"),
            blocks: Vec::new(),
            running: false,
            step: 0,
            highlighter,
        }
    }

    pub fn vars(&self) -> &EnvironmentTable {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut EnvironmentTable {
        &mut self.vars
    }

    pub fn secrets(&self) -> &EnvironmentTable {
        &self.secrets
    }

    pub fn secrets_mut(&mut self) -> &mut EnvironmentTable {
        &mut self.secrets
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Add a block after removing the selection marker from its tags.
    ///
    /// Returns `Ok(false)` when no tags remain and the block is dropped.
    /// Fails when the first tag names neither an action nor an interpreter.
    pub fn add(&mut self, code: &str, tags: Vec<String>, selection_marker: &str) -> Result<bool> {
        let tags = strip_selection_marker(tags, selection_marker);
        if tags.is_empty() {
            debug!("dropping block without tags");
            return Ok(false);
        }
        self.blocks.push(Block::new(code, tags)?);
        Ok(true)
    }

    pub fn add_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Snapshot of the variables and every block's history. Secrets are left out.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            code_blocks: self.blocks.iter().map(Block::to_record).collect(),
            env: self.vars.vars().clone(),
        }
    }

    /// Run blocks in order from `options.step`.
    ///
    /// Fails with [`RundocError::CodeFailed`] once a step exhausts its retries
    /// and with [`RundocError::Interrupted`] when `interrupt` is raised. The
    /// record is handed to `sink` before either error and on normal completion.
    #[instrument(skip_all, fields(blocks = self.blocks.len(), step = options.step, ask = options.ask))]
    pub fn run(
        &mut self,
        options: &RunOptions,
        prompter: &dyn Prompter,
        mut sink: Option<&mut dyn RecordSink>,
        interrupt: &Interrupt,
    ) -> Result<RunStop> {
        if self.running {
            bail!("commander is already running");
        }
        if options.step == 0 {
            bail!("steps are numbered from 1");
        }

        self.step = options.step;
        if let Err(err) = self.prepare_environment(options, prompter) {
            if interrupt.is_triggered() {
                return self.halt_interrupted(sink);
            }
            self.step = 0;
            return Err(err);
        }

        println!(
            "\n{}",
            style("Running code blocks from supplied documentation.").bold()
        );
        if options.reviews_code() {
            println!(
                "{}",
                style("Modify and/or confirm displayed code by pressing Return.").bold()
            );
        }

        self.running = true;
        let mut ask_once = false;
        while self.step <= self.blocks.len() {
            if interrupt.is_triggered() {
                return self.halt_interrupted(sink);
            }
            let step = self.step;
            let prompt_this_time = options.ask >= ASK_EVERY_STEP
                || ask_once
                || options.breakpoints.contains(&step);

            let block = &mut self.blocks[step - 1];
            println!(
                "\n{}",
                style(format!("=== Step {step} [{}]", block.interpreter())).bold()
            );
            let attempt = if prompt_this_time {
                block.run(Some(prompter), interrupt)
            } else {
                println!("{}", step_preview(&self.highlighter, block));
                if !pause(options.pause, interrupt) {
                    return self.halt_interrupted(sink);
                }
                block.run(None, interrupt)
            };
            let outcome = match attempt {
                Ok(outcome) => outcome,
                Err(err) => {
                    self.running = false;
                    return Err(err);
                }
            };

            let retcode = match outcome {
                AttemptOutcome::Exited(0) => {
                    println!("{}", style(format!("==== Step {step} done")).green());
                    ask_once = false;
                    self.step += 1;
                    continue;
                }
                AttemptOutcome::Exited(retcode) => retcode,
                AttemptOutcome::Interrupted => return self.halt_interrupted(sink),
                AttemptOutcome::Terminate => {
                    info!(step, "run terminated by action");
                    self.step = 0;
                    self.finish(&mut sink)?;
                    return Ok(RunStop::Terminated);
                }
            };

            let attempts = block.runs().len();
            self.running = false;
            println!(
                "{}",
                style(format!("==== Failed at step {step} with exit code '{retcode}'")).red()
            );
            if options.ask >= ASK_ON_FAILURE {
                let message = style(format!(
                    "Press RETURN to try again at step {step}.\nCtrl+C to quit."
                ))
                .red()
                .bold();
                if let Err(err) = prompter.acknowledge(&message.to_string()) {
                    if interrupt.is_triggered() {
                        return self.halt_interrupted(sink);
                    }
                    return Err(err);
                }
                ask_once = true;
                self.running = true;
                continue;
            }
            if attempts > options.retry as usize {
                warn!(step, retcode, attempts, "retries exhausted");
                self.finish(&mut sink)?;
                return Err(RundocError::CodeFailed {
                    step,
                    exit_code: Some(retcode),
                }
                .into());
            }
            println!("{}", style(format!("Retry number {attempts}.")).bold());
            if !pause(options.pause.max(options.retry_pause), interrupt) {
                return self.halt_interrupted(sink);
            }
            self.running = true;
        }

        info!("run completed");
        self.step = 0;
        self.finish(&mut sink)?;
        Ok(RunStop::Completed)
    }

    /// Inherit, prompt for and load the variable and secret tables.
    fn prepare_environment(&mut self, options: &RunOptions, prompter: &dyn Prompter) -> Result<()> {
        if options.inherit_env {
            self.vars.inherit_from_process_env();
            self.secrets.inherit_from_process_env();
        }
        if options.ask >= ASK_ENV {
            self.vars.prompt_for_edits(prompter)?;
            self.secrets.prompt_for_edits(prompter)?;
        } else {
            self.vars.prompt_for_missing(prompter)?;
            self.secrets.prompt_for_missing(prompter)?;
        }
        self.vars.load_into_process_env();
        self.secrets.load_into_process_env();
        Ok(())
    }

    /// Leave the running state and hand the record to the sink.
    fn finish(&mut self, sink: &mut Option<&mut dyn RecordSink>) -> Result<()> {
        self.running = false;
        if let Some(sink) = sink.as_deref_mut() {
            sink.persist(&self.record())?;
        }
        Ok(())
    }

    fn halt_interrupted(&mut self, mut sink: Option<&mut dyn RecordSink>) -> Result<RunStop> {
        let step = self.step;
        let err = RundocError::Interrupted { step };
        println!("\n{}\n", style(format!("==== {err}")).red());
        self.finish(&mut sink)?;
        Err(err.into())
    }
}

/// The code the next attempt of `block` will run, highlighted.
fn step_preview(highlighter: &Highlighter, block: &Block) -> String {
    highlighter.highlight(block.current_code().trim_end(), block.language())
}

/// Sleep for `duration`, waking early on interrupt. Returns `false` if interrupted.
fn pause(duration: Duration, interrupt: &Interrupt) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if interrupt.is_triggered() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(PAUSE_POLL.min(deadline - now));
    }
}
