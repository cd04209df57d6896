//! Built-in actions that run in-process instead of through an interpreter.
//!
//! An action is selected by the first tag of a block. Arguments follow the
//! action name, separated by `:`:
//!
//! ```text
//! create-file:~/.config/app.cfg:640:deploy:staff
//! ```
//!
//! File actions take `PATH[:OCTAL_PERMISSIONS[:USER[:GROUP]]]`. An empty
//! segment means "use the default" for that position. The `r-` variants fill
//! `%:NAME:%` placeholders from the process environment before writing.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use nix::unistd::{Gid, Group, Uid, User, chown, getegid, geteuid};
use tracing::{debug, instrument, warn};

use crate::core::placeholder::{fill_placeholders, placeholder_names};

const DEFAULT_PERMISSIONS: u32 = 0o644;

/// Result of a successful action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// Finished with this exit code.
    Completed(i32),
    /// Stop the whole program now, successfully.
    Terminate,
}

type Handler = fn(&[String], &str) -> Result<ActionOutcome>;

/// A registered action.
pub struct ActionSpec {
    pub name: &'static str,
    pub usage: &'static str,
    handler: Handler,
}

impl ActionSpec {
    pub fn invoke(&self, args: &[String], content: &str) -> Result<ActionOutcome> {
        (self.handler)(args, content)
    }
}

impl std::fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionSpec").field("name", &self.name).finish()
    }
}

static ACTIONS: [ActionSpec; 5] = [
    ActionSpec {
        name: "create-file",
        usage: "create-file:PATH[:OCTAL_PERMISSIONS[:USER[:GROUP]]]",
        handler: create_file,
    },
    ActionSpec {
        name: "r-create-file",
        usage: "r-create-file:PATH[:OCTAL_PERMISSIONS[:USER[:GROUP]]]",
        handler: r_create_file,
    },
    ActionSpec {
        name: "append-file",
        usage: "append-file:PATH[:OCTAL_PERMISSIONS[:USER[:GROUP]]]",
        handler: append_file,
    },
    ActionSpec {
        name: "r-append-file",
        usage: "r-append-file:PATH[:OCTAL_PERMISSIONS[:USER[:GROUP]]]",
        handler: r_append_file,
    },
    ActionSpec {
        name: "usage",
        usage: "usage",
        handler: usage,
    },
];

/// Every registered action, in registration order.
pub fn actions() -> &'static [ActionSpec] {
    &ACTIONS
}

pub fn lookup(name: &str) -> Option<&'static ActionSpec> {
    actions().iter().find(|action| action.name == name)
}

/// Split a first tag into its name and `:`-separated arguments.
pub fn split_action_tag(tag: &str) -> (&str, Vec<String>) {
    let mut parts = tag.split(':');
    let name = parts.next().unwrap_or_default();
    (name, parts.map(str::to_string).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Truncate,
    Append,
}

/// Parsed `PATH[:PERMISSIONS[:USER[:GROUP]]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileTarget {
    path: PathBuf,
    permissions: u32,
    user: Option<String>,
    group: Option<String>,
}

impl FileTarget {
    fn parse(args: &[String]) -> Result<Self> {
        let arg = |index: usize| {
            args.get(index)
                .map(String::as_str)
                .filter(|value| !value.is_empty())
        };
        let Some(path) = arg(0) else {
            bail!("file action needs a target path");
        };
        let permissions = match arg(1) {
            Some(octal) => u32::from_str_radix(octal, 8)
                .with_context(|| format!("invalid octal permissions '{octal}'"))?,
            None => DEFAULT_PERMISSIONS,
        };
        Ok(Self {
            path: expand_tilde(path),
            permissions,
            user: arg(2).map(str::to_string),
            group: arg(3).map(str::to_string),
        })
    }

    /// Owner for the file: the named user (or the effective user) and the
    /// named group, else the user's primary group, else the effective group.
    fn owner(&self) -> Result<(Uid, Gid)> {
        let user = match &self.user {
            Some(name) => Some(
                User::from_name(name)
                    .with_context(|| format!("look up user '{name}'"))?
                    .with_context(|| format!("no such user '{name}'"))?,
            ),
            None => None,
        };
        let uid = user.as_ref().map_or_else(geteuid, |user| user.uid);
        let gid = match &self.group {
            Some(name) => {
                Group::from_name(name)
                    .with_context(|| format!("look up group '{name}'"))?
                    .with_context(|| format!("no such group '{name}'"))?
                    .gid
            }
            None => user.as_ref().map_or_else(getegid, |user| user.gid),
        };
        Ok((uid, gid))
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[instrument(skip_all, fields(?mode, fill))]
fn write_file(args: &[String], content: &str, mode: WriteMode, fill: bool) -> Result<ActionOutcome> {
    let target = FileTarget::parse(args)?;
    let (uid, gid) = target.owner()?;
    let body = if fill {
        for name in placeholder_names(content) {
            if std::env::var_os(&name).is_none() {
                warn!(name = %name, "placeholder has no value, filling with empty string");
            }
        }
        fill_placeholders(content, |name| std::env::var(name).ok())
    } else {
        content.to_string()
    };

    let mut options = OpenOptions::new();
    match mode {
        WriteMode::Truncate => options.write(true).create(true).truncate(true),
        WriteMode::Append => options.append(true).create(true),
    };
    let mut file = options
        .open(&target.path)
        .with_context(|| format!("open {}", target.path.display()))?;
    file.write_all(body.as_bytes())
        .and_then(|()| file.write_all(b"\n"))
        .with_context(|| format!("write {}", target.path.display()))?;
    drop(file);

    fs::set_permissions(&target.path, fs::Permissions::from_mode(target.permissions))
        .with_context(|| format!("chmod {:o} {}", target.permissions, target.path.display()))?;
    chown(target.path.as_path(), Some(uid), Some(gid))
        .with_context(|| format!("chown {uid}:{gid} {}", target.path.display()))?;

    debug!(
        path = %target.path.display(),
        permissions = %format!("{:o}", target.permissions),
        "file written"
    );
    Ok(ActionOutcome::Completed(0))
}

fn create_file(args: &[String], content: &str) -> Result<ActionOutcome> {
    write_file(args, content, WriteMode::Truncate, false)
}

fn r_create_file(args: &[String], content: &str) -> Result<ActionOutcome> {
    write_file(args, content, WriteMode::Truncate, true)
}

fn append_file(args: &[String], content: &str) -> Result<ActionOutcome> {
    write_file(args, content, WriteMode::Append, false)
}

fn r_append_file(args: &[String], content: &str) -> Result<ActionOutcome> {
    write_file(args, content, WriteMode::Append, true)
}

/// Show the block's text and stop the program.
fn usage(_args: &[String], content: &str) -> Result<ActionOutcome> {
    println!("{content}");
    Ok(ActionOutcome::Terminate)
}
