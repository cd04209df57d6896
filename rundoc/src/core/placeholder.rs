//! `%:NAME:%` placeholder substitution for action block contents.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%:([A-Za-z_][A-Za-z0-9_]*):%").expect("valid placeholder regex"));

/// Replace every well-formed `%:NAME:%` with `lookup(NAME)`.
///
/// Names that resolve to `None` become the empty string. Markers that are not
/// both opened and closed around a valid identifier are left untouched.
pub fn fill_placeholders<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            lookup(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Placeholder names referenced by `text`, in order of first appearance.
pub fn placeholder_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|seen| seen == name) {
            names.push(name.to_string());
        }
    }
    names
}
