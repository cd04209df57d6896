//! Tag-based block selection.
//!
//! A fenced block carries an ordered tag list taken from its info string
//! (`bash#setup#db`). The first tag names the interpreter or action, the rest
//! are free labels. Two reserved first tags turn a block into a declaration
//! instead of something to run: `env`/`environ`/`environment` for variables
//! and `secret`/`secrets` for secrets.
//!
//! Category checks always win over the any/all/none filters, so a tag set is
//! never both a declaration and a runnable block.

/// Default separator between tags in a fence info string.
pub const DEFAULT_SEPARATOR: &str = "#";

/// Marker appended to the tags of blocks picked by a [`TagFilter`].
pub const SELECTION_MARKER: &str = "rundoc_selected";

const ENV_KEYWORDS: [&str; 3] = ["env", "environ", "environment"];
const SECRET_KEYWORDS: [&str; 2] = ["secret", "secrets"];

/// What a tag set declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Environment,
    Secret,
    Code,
}

/// Split a separator-joined tag string into trimmed, non-empty tags.
pub fn split_tags(class_name: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        let trimmed = class_name.trim();
        return if trimmed.is_empty() {
            Vec::new()
        } else {
            vec![trimmed.to_string()]
        };
    }
    class_name
        .split(separator)
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Name part of a tag, i.e. everything before the first `:`.
///
/// `create-file:~/app.cfg:640` has the name `create-file`.
pub fn tag_name(tag: &str) -> &str {
    tag.split(':').next().unwrap_or(tag)
}

pub fn category(tags: &[String]) -> Category {
    let Some(first) = tags.first() else {
        return Category::Code;
    };
    let name = tag_name(first);
    if ENV_KEYWORDS.contains(&name) {
        Category::Environment
    } else if SECRET_KEYWORDS.contains(&name) {
        Category::Secret
    } else {
        Category::Code
    }
}

pub fn is_code(tags: &[String]) -> bool {
    category(tags) == Category::Code
}

/// Remove every occurrence of `marker` from `tags`.
///
/// The result may be empty; such blocks are dropped by the caller.
pub fn strip_selection_marker(tags: Vec<String>, marker: &str) -> Vec<String> {
    tags.into_iter().filter(|tag| tag != marker).collect()
}

/// Three-way tag filter. An empty list leaves that axis unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    /// At least one of these must be present.
    pub any_of: Vec<String>,
    /// All of these must be present.
    pub all_of: Vec<String>,
    /// None of these may be present.
    pub none_of: Vec<String>,
}

impl TagFilter {
    pub fn new(any_of: Vec<String>, all_of: Vec<String>, none_of: Vec<String>) -> Self {
        Self {
            any_of,
            all_of,
            none_of,
        }
    }

    /// Build a filter from three separator-joined strings, as typed on the CLI.
    pub fn parse(any_of: &str, all_of: &str, none_of: &str, separator: &str) -> Self {
        Self::new(
            split_tags(any_of, separator),
            split_tags(all_of, separator),
            split_tags(none_of, separator),
        )
    }

    pub fn is_unconstrained(&self) -> bool {
        self.any_of.is_empty() && self.all_of.is_empty() && self.none_of.is_empty()
    }

    /// Evaluate the any/all/none axes against `tags`, ignoring categories.
    pub fn matches(&self, tags: &[String]) -> bool {
        let has = |wanted: &String| has_tag(tags, wanted);
        (self.any_of.is_empty() || self.any_of.iter().any(has))
            && self.all_of.iter().all(has)
            && !self.none_of.iter().any(has)
    }

    /// A block is runnable iff it is not a declaration and passes the filter.
    pub fn is_runnable(&self, tags: &[String]) -> bool {
        is_code(tags) && self.matches(tags)
    }
}

/// Whether `wanted` is one of `tags`.
///
/// The first tag also matches by its name alone, so `create-file` selects
/// `create-file:~/app.cfg:640`.
fn has_tag(tags: &[String], wanted: &str) -> bool {
    tags.iter()
        .enumerate()
        .any(|(index, tag)| tag == wanted || (index == 0 && tag_name(tag) == wanted))
}
