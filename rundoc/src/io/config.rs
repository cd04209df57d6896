//! Optional `rundoc.toml` configuration.
//!
//! Precedence: CLI flags, then this file, then built-in defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::tags::{DEFAULT_SEPARATOR, SELECTION_MARKER};
use crate::io::atomic::write_atomic;

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "rundoc.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RundocConfig {
    pub run: RunConfig,
    pub document: DocumentConfig,
}

/// Defaults for `rundoc run` and `rundoc rerun`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Ask level, 0 to 3.
    pub ask: u8,
    /// Seconds to wait before each block that runs without a prompt.
    pub pause_secs: f64,
    /// Automatic retries of a failing block.
    pub retry: u32,
    /// Minimum seconds between automatic retries.
    pub retry_pause_secs: f64,
    pub inherit_env: bool,
    /// Highlight for light terminal backgrounds.
    pub light: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ask: 1,
            pause_secs: 0.0,
            retry: 0,
            retry_pause_secs: 1.0,
            inherit_env: false,
            light: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DocumentConfig {
    /// Separator between tags in fence info strings.
    pub tag_separator: String,
    pub selection_marker: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            tag_separator: DEFAULT_SEPARATOR.to_string(),
            selection_marker: SELECTION_MARKER.to_string(),
        }
    }
}

impl RundocConfig {
    pub fn validate(&self) -> Result<()> {
        if self.run.ask > 3 {
            return Err(anyhow!("run.ask must be between 0 and 3"));
        }
        if !(self.run.pause_secs.is_finite() && self.run.pause_secs >= 0.0) {
            return Err(anyhow!("run.pause_secs must be >= 0"));
        }
        if !(self.run.retry_pause_secs.is_finite() && self.run.retry_pause_secs >= 0.0) {
            return Err(anyhow!("run.retry_pause_secs must be >= 0"));
        }
        if self.document.tag_separator.is_empty() {
            return Err(anyhow!("document.tag_separator must not be empty"));
        }
        if self.document.selection_marker.trim().is_empty() {
            return Err(anyhow!("document.selection_marker must not be empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RundocConfig::default()`.
pub fn load_config(path: &Path) -> Result<RundocConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = RundocConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RundocConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    debug!(path = %path.display(), "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RundocConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf).with_context(|| format!("write config {}", path.display()))
}
