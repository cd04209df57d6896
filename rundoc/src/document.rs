//! Markdown documents to blocks and declarations.
//!
//! Fenced blocks are tagged from their info strings, selected with a
//! [`TagFilter`], and handed to a [`Commander`]. Environment and secret
//! declarations are imported into its tables. The same scan backs the
//! `list-tags`, `list-blocks` and `clean-doc` commands.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::block::Block;
use crate::commander::Commander;
use crate::core::fence::{scan_fences, strip_info_tags};
use crate::core::record::SessionRecord;
use crate::core::tags::{
    Category, DEFAULT_SEPARATOR, SELECTION_MARKER, TagFilter, category, split_tags,
};
use crate::io::highlight::Highlighter;

const BLOCK_LISTING_TEMPLATE: &str = include_str!("templates/block_listing.txt");

/// How a document is turned into blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentOptions {
    pub filter: TagFilter,
    /// Concatenate every selected block into one block for this interpreter.
    pub single_session: Option<String>,
    pub separator: String,
    pub selection_marker: String,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            filter: TagFilter::default(),
            single_session: None,
            separator: DEFAULT_SEPARATOR.to_string(),
            selection_marker: SELECTION_MARKER.to_string(),
        }
    }
}

/// A fenced block with its tags; selected blocks carry the selection marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedBlock {
    pub code: String,
    pub tags: Vec<String>,
    /// 1-based line of the opening fence.
    pub line: usize,
}

/// Tag every fenced block and mark the selected ones.
///
/// Code blocks are selected when they are runnable under the filter.
/// Declarations are selected when they carry no extra tags or when their
/// tags pass the filter.
pub fn tag_blocks(markdown: &str, options: &DocumentOptions) -> Vec<TaggedBlock> {
    scan_fences(markdown)
        .into_iter()
        .map(|fence| {
            let mut tags = split_tags(&fence.info, &options.separator);
            let selected = match category(&tags) {
                Category::Code => options.filter.is_runnable(&tags),
                Category::Environment | Category::Secret => {
                    tags.len() == 1 || options.filter.matches(&tags)
                }
            };
            if selected {
                tags.push(options.selection_marker.clone());
            }
            TaggedBlock {
                code: fence.code,
                tags,
                line: fence.line,
            }
        })
        .collect()
}

/// Load selected blocks and declarations from `markdown` into `commander`.
pub fn load_document(
    markdown: &str,
    options: &DocumentOptions,
    commander: &mut Commander,
) -> Result<()> {
    let marker = options.selection_marker.as_str();
    let mut session_code = String::new();
    let mut session_blocks = 0usize;

    for block in tag_blocks(markdown, options) {
        if !block.tags.iter().any(|tag| tag == marker) {
            continue;
        }
        let line = block.line;
        match category(&block.tags) {
            Category::Environment => commander
                .vars_mut()
                .import_text(&block.code, true)
                .with_context(|| format!("environment block at line {line}"))?,
            Category::Secret => commander
                .secrets_mut()
                .import_text(&block.code, true)
                .with_context(|| format!("secrets block at line {line}"))?,
            Category::Code if options.single_session.is_some() => {
                session_code.push_str(&block.code);
                session_blocks += 1;
            }
            Category::Code => {
                let added = commander
                    .add(&block.code, block.tags, marker)
                    .with_context(|| format!("code block at line {line}"))?;
                if !added {
                    debug!(line, "skipping untagged block");
                }
            }
        }
    }

    if let Some(interpreter) = &options.single_session
        && session_blocks > 0
    {
        commander.add(&session_code, vec![interpreter.clone()], marker)?;
    }
    debug!(
        unfiltered = options.filter.is_unconstrained(),
        blocks = commander.blocks().len(),
        vars = commander.vars().len(),
        secrets = commander.secrets().len(),
        "document loaded"
    );
    Ok(())
}

/// Rebuild blocks from a session record. Each block's last attempt becomes
/// its new base code; the record's env fills empty document values.
pub fn load_session_record(record: &SessionRecord, commander: &mut Commander) -> Result<()> {
    for (index, block) in record.code_blocks.iter().enumerate() {
        let block = Block::from_record(block)
            .with_context(|| format!("record block {}", index + 1))?;
        commander.add_block(block);
    }
    commander.vars_mut().extend(&record.env, true);
    Ok(())
}

/// Every tag in the document with its number of occurrences, most frequent
/// first; ties keep first-seen order.
pub fn list_tags(markdown: &str, separator: &str, selection_marker: &str) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for fence in scan_fences(markdown) {
        for tag in split_tags(&fence.info, separator) {
            if tag == selection_marker {
                continue;
            }
            match counts.iter_mut().find(|(seen, _)| *seen == tag) {
                Some((_, count)) => *count += 1,
                None => counts.push((tag, 1)),
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

#[derive(Debug, Serialize)]
struct ListedBlock {
    interpreter: String,
    tags: Vec<String>,
    code: String,
}

/// Describe the blocks a run would execute: the session record as pretty
/// JSON, or a numbered listing with highlighted code.
pub fn list_blocks(
    markdown: &str,
    options: &DocumentOptions,
    pretty: bool,
    highlighter: &Highlighter,
) -> Result<String> {
    let mut commander = Commander::new();
    load_document(markdown, options, &mut commander)?;
    if !pretty {
        let mut json =
            serde_json::to_string_pretty(&commander.record()).context("serialize blocks")?;
        json.push('\n');
        return Ok(json);
    }

    let blocks: Vec<ListedBlock> = commander
        .blocks()
        .iter()
        .map(|block| ListedBlock {
            interpreter: block.interpreter().to_string(),
            tags: block.tags().to_vec(),
            code: highlighter.highlight(block.code().trim_end(), block.language()),
        })
        .collect();
    let mut env = Environment::new();
    env.add_template("block_listing.txt", BLOCK_LISTING_TEMPLATE)
        .context("load block listing template")?;
    let rendered = env
        .get_template("block_listing.txt")?
        .render(context! {
            blocks => blocks,
            separator => options.separator.as_str(),
        })
        .context("render block listing")?;
    Ok(rendered)
}

/// Strip tags from fence info strings, keeping only the interpreter name.
pub fn clean_document(markdown: &str) -> String {
    strip_info_tags(markdown)
}
