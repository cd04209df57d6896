//! Run fenced code blocks from markdown documents, one step at a time.
//!
//! Blocks are selected by their tags (` ```bash#setup `), executed in order,
//! and every attempt can be written to a session record for `rundoc rerun`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use console::style;
use tracing::debug;

use rundoc::commander::{Commander, RunOptions, RunStop};
use rundoc::core::tags::TagFilter;
use rundoc::document::{self, DocumentOptions};
use rundoc::error::RundocError;
use rundoc::exit_codes;
use rundoc::io::config::{DEFAULT_CONFIG_FILE, RundocConfig, load_config, write_config};
use rundoc::io::highlight::Highlighter;
use rundoc::io::interrupt::Interrupt;
use rundoc::io::prompt::TerminalPrompter;
use rundoc::io::record_store::{FileRecordSink, RecordSink, load_record};
use rundoc::logging;

#[derive(Parser)]
#[command(
    name = "rundoc",
    version,
    about = "Run code blocks from markdown documentation step by step"
)]
struct Cli {
    /// Show debug diagnostics on stderr (`RUST_LOG` still wins).
    #[arg(long, global = true)]
    debug: bool,

    /// Config file [default: ./rundoc.toml when present].
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the selected code blocks of a markdown document.
    Run {
        file: PathBuf,

        #[command(flatten)]
        select: SelectArgs,

        /// Join all selected blocks into one block for this interpreter.
        #[arg(short, long, value_name = "INTERPRETER")]
        single_session: Option<String>,

        /// Override a variable, `KEY=VALUE` (repeatable).
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        #[command(flatten)]
        control: RunControl,
    },
    /// Run the blocks of a session record written with `--output`.
    Rerun {
        record: PathBuf,

        /// Override a variable, `KEY=VALUE` (repeatable).
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        #[command(flatten)]
        control: RunControl,
    },
    /// Print every tag in a document with its number of occurrences.
    ListTags {
        file: PathBuf,

        /// Separator between tags in fence info strings.
        #[arg(long)]
        separator: Option<String>,
    },
    /// Print the blocks a run would execute.
    ListBlocks {
        file: PathBuf,

        #[command(flatten)]
        select: SelectArgs,

        #[arg(short, long, value_name = "INTERPRETER")]
        single_session: Option<String>,

        /// Numbered listing with highlighted code instead of JSON.
        #[arg(long)]
        pretty: bool,

        /// Light terminal theme for highlighting.
        #[arg(short, long)]
        light: bool,
    },
    /// Print the document with tags stripped from fence info strings.
    CleanDoc { file: PathBuf },
    /// Write a config file with default values.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,

        /// Target path [default: ./rundoc.toml].
        path: Option<PathBuf>,
    },
}

/// Tag selection flags shared by `run` and `list-blocks`.
#[derive(Args)]
struct SelectArgs {
    /// Run blocks carrying any of these tags.
    #[arg(short = 't', long = "tags", default_value = "")]
    any_of: String,

    /// Run only blocks carrying all of these tags.
    #[arg(short = 'T', long = "must-have-tags", default_value = "")]
    all_of: String,

    /// Skip blocks carrying any of these tags.
    #[arg(short = 'N', long = "must-not-have-tags", default_value = "")]
    none_of: String,

    /// Separator between tags, in the document and in these flags.
    #[arg(long)]
    separator: Option<String>,
}

/// Run-loop flags; unset values come from the config file.
#[derive(Args)]
struct RunControl {
    /// Step to start at (1-based).
    #[arg(long, default_value_t = 1)]
    step: usize,

    /// 0: never ask, 1: confirm env, 2: also wait on failure, 3: confirm every step.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=3))]
    ask: Option<u8>,

    /// Always prompt at this step (repeatable).
    #[arg(short, long = "breakpoint", value_name = "STEP")]
    breakpoints: Vec<usize>,

    /// Seconds to wait before each unprompted step.
    #[arg(short, long, value_name = "SECS")]
    pause: Option<f64>,

    /// Automatic retries of a failing step.
    #[arg(short, long)]
    retry: Option<u32>,

    /// Seconds to wait before a retry.
    #[arg(short = 'P', long, value_name = "SECS")]
    retry_pause: Option<f64>,

    /// Prefer non-empty values from the process environment.
    #[arg(short, long)]
    inherit_env: bool,

    /// Write the session record to this file.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Light terminal theme for highlighting.
    #[arg(short, long)]
    light: bool,
}

fn main() {
    // Usage errors share the invalid-input code; clap's own 2 means a failed step here.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    logging::init(cli.debug);
    if let Err(err) = execute(cli) {
        std::process::exit(report(&err));
    }
}

/// Print `err` and pick the exit code for it.
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RundocError>() {
        Some(RundocError::Interrupted { .. }) => exit_codes::INTERRUPTED,
        Some(RundocError::CodeFailed { .. }) => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            exit_codes::CODE_FAILED
        }
        _ => {
            eprintln!("{} {:#}", style("error:").red().bold(), err);
            exit_codes::INVALID
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let config = resolve_config(cli.config.as_deref())?;
    match cli.command {
        Command::Run {
            file,
            select,
            single_session,
            env,
            control,
        } => {
            let options = document_options(&config, select, single_session);
            let markdown = read_document(&file)?;
            let mut commander = Commander::with_highlighter(Highlighter::new(
                control.light || config.run.light,
            ));
            document::load_document(&markdown, &options, &mut commander)
                .with_context(|| format!("load {}", file.display()))?;
            apply_env_overrides(&mut commander, &env)?;
            run_commander(&mut commander, &config, &control)
        }
        Command::Rerun {
            record,
            env,
            control,
        } => {
            let session = load_record(&record)?;
            let mut commander = Commander::with_highlighter(Highlighter::new(
                control.light || config.run.light,
            ));
            document::load_session_record(&session, &mut commander)
                .with_context(|| format!("load {}", record.display()))?;
            apply_env_overrides(&mut commander, &env)?;
            run_commander(&mut commander, &config, &control)
        }
        Command::ListTags { file, separator } => {
            let markdown = read_document(&file)?;
            let separator = separator.unwrap_or_else(|| config.document.tag_separator.clone());
            for (tag, count) in
                document::list_tags(&markdown, &separator, &config.document.selection_marker)
            {
                println!("{tag}\t{count}");
            }
            Ok(())
        }
        Command::ListBlocks {
            file,
            select,
            single_session,
            pretty,
            light,
        } => {
            let options = document_options(&config, select, single_session);
            let markdown = read_document(&file)?;
            let highlighter = Highlighter::new(light || config.run.light);
            let listing = document::list_blocks(&markdown, &options, pretty, &highlighter)
                .with_context(|| format!("list blocks of {}", file.display()))?;
            print!("{listing}");
            Ok(())
        }
        Command::CleanDoc { file } => {
            let markdown = read_document(&file)?;
            print!("{}", document::clean_document(&markdown));
            Ok(())
        }
        Command::InitConfig { force, path } => {
            let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            write_config(&path, &RundocConfig::default())?;
            println!("Config written to: {}", path.display());
            Ok(())
        }
    }
}

/// `--config PATH` must exist; the implicit `./rundoc.toml` is optional.
fn resolve_config(explicit: Option<&Path>) -> Result<RundocConfig> {
    match explicit {
        Some(path) if !path.exists() => bail!("config file {} not found", path.display()),
        Some(path) => load_config(path),
        None => load_config(Path::new(DEFAULT_CONFIG_FILE)),
    }
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

fn document_options(
    config: &RundocConfig,
    select: SelectArgs,
    single_session: Option<String>,
) -> DocumentOptions {
    let separator = select
        .separator
        .filter(|sep| !sep.is_empty())
        .unwrap_or_else(|| config.document.tag_separator.clone());
    DocumentOptions {
        filter: TagFilter::parse(&select.any_of, &select.all_of, &select.none_of, &separator),
        single_session,
        separator,
        selection_marker: config.document.selection_marker.clone(),
    }
}

fn apply_env_overrides(commander: &mut Commander, overrides: &[String]) -> Result<()> {
    for pair in overrides {
        commander
            .vars_mut()
            .import_text(pair, false)
            .with_context(|| format!("--env {pair}"))?;
    }
    Ok(())
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid {flag} value {value}"))
}

fn run_options(config: &RundocConfig, control: &RunControl) -> Result<RunOptions> {
    Ok(RunOptions {
        step: control.step,
        ask: control.ask.unwrap_or(config.run.ask),
        breakpoints: control.breakpoints.clone(),
        pause: seconds(control.pause.unwrap_or(config.run.pause_secs), "--pause")?,
        retry: control.retry.unwrap_or(config.run.retry),
        retry_pause: seconds(
            control.retry_pause.unwrap_or(config.run.retry_pause_secs),
            "--retry-pause",
        )?,
        inherit_env: control.inherit_env || config.run.inherit_env,
    })
}

fn run_commander(
    commander: &mut Commander,
    config: &RundocConfig,
    control: &RunControl,
) -> Result<()> {
    let options = run_options(config, control)?;
    let interrupt = Interrupt::install_ctrlc_handler()?;
    let prompter = TerminalPrompter::new(control.light || config.run.light);
    let mut sink = control.output.clone().map(FileRecordSink::new);
    debug!(blocks = commander.blocks().len(), "starting run");

    let result = commander.run(
        &options,
        &prompter,
        sink.as_mut().map(|sink| sink as &mut dyn RecordSink),
        &interrupt,
    );
    if let Some(sink) = &sink
        && sink.path().exists()
    {
        println!("Output written to: {}", sink.path().display());
    }
    match result? {
        RunStop::Completed => debug!("all steps completed"),
        RunStop::Terminated => debug!("run terminated by action"),
    }
    Ok(())
}
