//! Run an interpreter over a piece of code while streaming its output.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::interrupt::Interrupt;

/// How often the interrupt flag is checked while a child runs.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of a streamed child process.
#[derive(Debug)]
pub struct StreamOutcome {
    pub status: ExitStatus,
    /// The child was killed because the interrupt flag was raised.
    pub interrupted: bool,
}

impl StreamOutcome {
    pub fn exit_code(&self) -> i32 {
        exit_code(self.status)
    }
}

/// Exit code of `status`; death by signal `N` maps to `-N`.
pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => -signal,
        (None, None) => -1,
    }
}

/// Spawn `cmd`, feed `stdin` to it and close it, then pass combined
/// stdout/stderr to `on_output` line by line until the child exits.
///
/// The interrupt flag is polled between reads; when it is raised the child is
/// killed and whatever output already arrived is still delivered.
#[instrument(skip_all, fields(program = ?cmd.get_program()))]
pub fn run_streaming(
    mut cmd: Command,
    stdin: &[u8],
    interrupt: &Interrupt,
    on_output: &mut dyn FnMut(&str),
) -> Result<StreamOutcome> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let (tx, rx) = mpsc::channel();
    spawn_reader(stdout, tx.clone());
    spawn_reader(stderr, tx);

    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let input = stdin.to_vec();
    thread::spawn(move || {
        // The child may exit without reading all of its input.
        if let Err(e) = child_stdin.write_all(&input) {
            debug!(err = %e, "child stdin closed early");
        }
    });

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(chunk) => on_output(&chunk),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if interrupt.is_triggered() {
            return kill_and_drain(child, &rx, on_output);
        }
    }

    loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL).context("wait for command")? {
            debug!(exit_code = exit_code(status), "command finished");
            return Ok(StreamOutcome {
                status,
                interrupted: false,
            });
        }
        if interrupt.is_triggered() {
            return kill_and_drain(child, &rx, on_output);
        }
    }
}

fn kill_and_drain(
    mut child: Child,
    rx: &Receiver<String>,
    on_output: &mut dyn FnMut(&str),
) -> Result<StreamOutcome> {
    warn!(pid = child.id(), "interrupted, killing child");
    if let Err(e) = child.kill() {
        // Already exited between the last poll and now.
        debug!(err = %e, "kill failed");
    }
    let status = child.wait().context("wait command after kill")?;
    while let Ok(chunk) = rx.try_recv() {
        on_output(&chunk);
    }
    Ok(StreamOutcome {
        status,
        interrupted: true,
    })
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        loop {
            let mut line = Vec::new();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(String::from_utf8_lossy(&line).into_owned()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(err = %e, "failed to read child output");
                    break;
                }
            }
        }
    });
}
