//! Session record: the serializable snapshot of a run.
//!
//! The record is what gets persisted after (or during) a run and what `rerun`
//! replays. Field declaration order matches sorted JSON keys so persisted
//! files stay stable; `env` keeps insertion order.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Insertion-ordered `name -> value` map.
///
/// The first write of a name fixes its position; later writes update the
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedVars {
    entries: Vec<(String, String)>,
}

impl OrderedVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Render as newline-separated `name=value` lines.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for OrderedVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Self::new();
        for (name, value) in iter {
            vars.insert(name, value);
        }
        vars
    }
}

impl Serialize for OrderedVars {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OrderedVars {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVarsVisitor;

        impl<'de> Visitor<'de> for OrderedVarsVisitor {
            type Value = OrderedVars;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of variable names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut vars = OrderedVars::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    vars.insert(key, value);
                }
                Ok(vars)
            }
        }

        deserializer.deserialize_map(OrderedVarsVisitor)
    }
}

/// One execution try of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAttempt {
    /// Combined stdout/stderr, appended while the attempt runs.
    pub output: String,
    /// `None` until the attempt finishes.
    pub retcode: Option<i32>,
    /// Seconds since the Unix epoch.
    pub time_start: Option<f64>,
    pub time_stop: Option<f64>,
    /// Code actually executed (may differ from the block's base code).
    pub user_code: String,
}

impl RunAttempt {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            retcode: None,
            time_start: None,
            time_stop: None,
            user_code: String::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.time_stop.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.retcode == Some(0)
    }
}

impl Default for RunAttempt {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized form of one block and its run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub code: String,
    pub interpreter: String,
    pub runs: Vec<RunAttempt>,
    pub tags: Vec<String>,
}

impl BlockRecord {
    /// Code to replay: the last attempt's `user_code`, or the base code if the
    /// block never ran.
    pub fn replay_code(&self) -> &str {
        match self.runs.last() {
            Some(run) => &run.user_code,
            None => &self.code,
        }
    }
}

/// Full session snapshot: environment plus every block's history.
///
/// Secrets are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub code_blocks: Vec<BlockRecord>,
    pub env: OrderedVars,
}
