//! Keyboard interrupt flag shared between the signal handler and the run loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::debug;

use crate::exit_codes;

/// Cloneable flag set when the user asks the run to stop.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a Ctrl-C handler that sets the returned flag.
    ///
    /// A second Ctrl-C while the flag is still set exits the process
    /// immediately, which gets the user out of a blocking prompt.
    pub fn install_ctrlc_handler() -> Result<Self> {
        let interrupt = Self::new();
        let flag = Arc::clone(&interrupt.flag);
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(exit_codes::INTERRUPTED);
            }
        })
        .context("install Ctrl-C handler")?;
        debug!("Ctrl-C handler installed");
        Ok(interrupt)
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
