//! Ordered environment tables and the process environment.
//!
//! A [`Commander`](crate::commander::Commander) owns two tables, one for
//! variables and one for secrets. Both are written into the process
//! environment right before the first block runs, so child interpreters and
//! placeholder-filling actions see them.

use anyhow::Result;
use console::style;
use tracing::debug;

use crate::core::record::OrderedVars;
use crate::error::RundocError;
use crate::io::prompt::Prompter;

/// Ordered `name -> value` table with merge, prompt and inherit behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentTable {
    vars: OrderedVars,
    /// Heading shown above interactive prompts.
    title: String,
}

impl EnvironmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vars(vars: OrderedVars) -> Self {
        Self {
            vars,
            title: String::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn vars(&self) -> &OrderedVars {
        &self.vars
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Render as `name=value` lines, the format accepted by [`Self::import_text`].
    pub fn render(&self) -> String {
        self.vars.render()
    }

    /// Set `name`.
    ///
    /// With `collect_existing` an empty `value` falls back to the table's
    /// current value, then to the process environment, then to `""`.
    pub fn append(&mut self, name: &str, value: &str, collect_existing: bool) {
        let value = if collect_existing && value.is_empty() {
            match self.vars.get(name).filter(|current| !current.is_empty()) {
                Some(current) => current.to_string(),
                None => std::env::var(name).unwrap_or_default(),
            }
        } else {
            value.to_string()
        };
        self.vars.insert(name, value);
    }

    /// [`Self::append`] every entry of `other`, in `other`'s order.
    pub fn extend(&mut self, other: &OrderedVars, collect_existing: bool) {
        for (name, value) in other.iter() {
            self.append(name, value, collect_existing);
        }
    }

    /// Parse newline-separated `name=value` lines into the table.
    ///
    /// Blank lines are skipped; the value is everything after the first `=`.
    /// Lines applied before a malformed one stay applied.
    pub fn import_text(&mut self, text: &str, collect_existing: bool) -> Result<()> {
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some((name, value)) = trimmed.split_once('=') else {
                return Err(bad_env(trimmed));
            };
            let name = name.trim();
            if !is_valid_name(name) {
                return Err(bad_env(trimmed));
            }
            self.append(name, value.trim(), collect_existing);
        }
        Ok(())
    }

    /// Let the user edit the whole table; the submission replaces the contents.
    pub fn prompt_for_edits(&mut self, prompter: &dyn Prompter) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        if !self.title.is_empty() {
            println!("\n{}", style(&self.title).bold());
        }
        println!(
            "{}",
            style("Confirm/supply/modify the values. Press Return to finish.").dim()
        );
        let submitted = prompter.edit(&self.render(), "env")?;
        self.vars.clear();
        self.import_text(&submitted, false)
    }

    /// Prompt only for entries whose value is empty, then merge the answers
    /// back. The user's answer wins, even when it is empty.
    ///
    /// The prompt is prefilled from the process environment where possible.
    pub fn prompt_for_missing(&mut self, prompter: &dyn Prompter) -> Result<()> {
        let mut missing = EnvironmentTable::new().with_title(self.title.clone());
        for (name, value) in self.vars.iter() {
            if value.is_empty() {
                missing.append(name, "", true);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        debug!(count = missing.len(), "prompting for missing variables");
        missing.prompt_for_edits(prompter)?;
        self.extend(&missing.vars, false);
        Ok(())
    }

    /// Non-empty values from the process environment replace table values.
    pub fn inherit_from_process_env(&mut self) {
        let names: Vec<String> = self.vars.iter().map(|(name, _)| name.to_string()).collect();
        for name in names {
            if let Ok(value) = std::env::var(&name)
                && !value.is_empty()
            {
                self.vars.insert(name, value);
            }
        }
    }

    /// Write every entry into the process environment, overwriting.
    #[allow(unsafe_code)]
    pub fn load_into_process_env(&self) {
        for (name, value) in self.vars.iter() {
            // SAFETY: blocks run sequentially on the thread that owns the
            // Commander and no other thread reads or writes the environment
            // while it is being loaded. Names are validated on import and
            // contain neither `=` nor NUL; values with NUL are skipped.
            if value.contains('\0') {
                debug!(name, "skipping value containing NUL");
                continue;
            }
            unsafe { std::env::set_var(name, value) };
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c == '\0' || c == '=')
}

fn bad_env(line: &str) -> anyhow::Error {
    RundocError::BadEnv {
        line: line.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedPrompter;

    fn table(pairs: &[(&str, &str)]) -> EnvironmentTable {
        EnvironmentTable::from_vars(pairs.iter().copied().collect())
    }

    #[test]
    fn import_keeps_order_and_renders_back() {
        let text = "zeta=1\nalpha=two words\n\nurl=http://x?a=b";
        let mut env = EnvironmentTable::new();
        env.import_text(text, false).expect("import");
        assert_eq!(env.render(), "zeta=1\nalpha=two words\nurl=http://x?a=b");
        let mut again = EnvironmentTable::new();
        again.import_text(&env.render(), false).expect("reimport");
        assert_eq!(again, env);
    }

    #[test]
    fn import_trims_names_and_values() {
        let mut env = EnvironmentTable::new();
        env.import_text("  a = b  \n   \n", false).expect("import");
        assert_eq!(env.get("a"), Some("b"));
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn malformed_lines_are_bad_env_and_not_rolled_back() {
        let mut env = EnvironmentTable::new();
        let err = env.import_text("a=1\nnot a pair\nb=2", false).unwrap_err();
        assert_eq!(
            err.downcast_ref::<RundocError>(),
            Some(&RundocError::BadEnv {
                line: "not a pair".to_string()
            })
        );
        assert_eq!(env.get("a"), Some("1"));
        assert_eq!(env.get("b"), None);

        let err = EnvironmentTable::new().import_text(" =value", false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RundocError>(),
            Some(RundocError::BadEnv { .. })
        ));
    }

    #[test]
    fn append_collects_from_table_then_process_env() {
        let seed = table(&[("RUNDOC_TEST_APPEND_OS", "from-os")]);
        seed.load_into_process_env();

        let mut env = table(&[("kept", "old")]);
        env.append("kept", "", true);
        assert_eq!(env.get("kept"), Some("old"));
        env.append("RUNDOC_TEST_APPEND_OS", "", true);
        assert_eq!(env.get("RUNDOC_TEST_APPEND_OS"), Some("from-os"));
        env.append("RUNDOC_TEST_APPEND_UNSET", "", true);
        assert_eq!(env.get("RUNDOC_TEST_APPEND_UNSET"), Some(""));
        env.append("kept", "", false);
        assert_eq!(env.get("kept"), Some(""));
    }

    #[test]
    fn extend_preserves_order_of_new_keys() {
        let mut env = table(&[("b", "1")]);
        let other: OrderedVars = [("c", "3"), ("b", "2"), ("a", "4")].into_iter().collect();
        env.extend(&other, false);
        assert_eq!(env.render(), "b=2\nc=3\na=4");
    }

    #[test]
    fn prompt_for_edits_replaces_contents() {
        let prompter = ScriptedPrompter::new().with_edit("x=9\nnew=1");
        let mut env = table(&[("a", "1"), ("x", "2")]);
        env.prompt_for_edits(&prompter).expect("prompt");
        assert_eq!(env.render(), "x=9\nnew=1");
        assert_eq!(prompter.shown(), vec!["a=1\nx=2".to_string()]);
    }

    #[test]
    fn prompt_for_edits_skips_empty_table() {
        let prompter = ScriptedPrompter::new();
        EnvironmentTable::new()
            .prompt_for_edits(&prompter)
            .expect("prompt");
        assert!(prompter.shown().is_empty());
    }

    #[test]
    fn prompt_for_missing_only_asks_for_empty_values() {
        let prompter = ScriptedPrompter::new().with_edit("RUNDOC_TEST_MISSING_B=typed");
        let mut env = table(&[("a", "set"), ("RUNDOC_TEST_MISSING_B", "")]);
        env.prompt_for_missing(&prompter).expect("prompt");
        assert_eq!(prompter.shown(), vec!["RUNDOC_TEST_MISSING_B=".to_string()]);
        assert_eq!(env.render(), "a=set\nRUNDOC_TEST_MISSING_B=typed");
    }

    #[test]
    fn prompt_for_missing_is_quiet_when_complete() {
        let prompter = ScriptedPrompter::new();
        let mut env = table(&[("a", "set")]);
        env.prompt_for_missing(&prompter).expect("prompt");
        assert!(prompter.shown().is_empty());
    }

    #[test]
    fn inherit_prefers_non_empty_process_values() {
        table(&[
            ("RUNDOC_TEST_INHERIT_SET", "os"),
            ("RUNDOC_TEST_INHERIT_EMPTY", ""),
        ])
        .load_into_process_env();

        let mut env = table(&[
            ("RUNDOC_TEST_INHERIT_SET", "doc"),
            ("RUNDOC_TEST_INHERIT_EMPTY", "doc"),
            ("RUNDOC_TEST_INHERIT_UNSET", "doc"),
        ]);
        env.inherit_from_process_env();
        assert_eq!(env.get("RUNDOC_TEST_INHERIT_SET"), Some("os"));
        assert_eq!(env.get("RUNDOC_TEST_INHERIT_EMPTY"), Some("doc"));
        assert_eq!(env.get("RUNDOC_TEST_INHERIT_UNSET"), Some("doc"));
    }

    #[test]
    fn load_overwrites_process_values() {
        table(&[("RUNDOC_TEST_LOAD", "first")]).load_into_process_env();
        table(&[("RUNDOC_TEST_LOAD", "second")]).load_into_process_env();
        assert_eq!(std::env::var("RUNDOC_TEST_LOAD").as_deref(), Ok("second"));
    }
}
