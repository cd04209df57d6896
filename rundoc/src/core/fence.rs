//! Line-based scanner for fenced code blocks in markdown text.
//!
//! Only fences matter here; prose, lists and inline code spans are skipped.

use std::sync::LazyLock;

use regex::Regex;

static OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(`{3,}|~{3,})[ \t]*([^`]*?)[ \t]*$").expect("valid fence regex")
});
static CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})[ \t]*$").expect("valid fence regex"));
static INFO_TAGS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(```[^#:\n]*).*$").expect("valid info regex"));

/// One fenced block as written in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence {
    /// Info string after the opening fence (`bash#setup`), trimmed.
    pub info: String,
    /// Lines between the fences, each terminated by `\n`.
    pub code: String,
    /// 1-based line number of the opening fence.
    pub line: usize,
}

/// Extract every fenced block in document order.
///
/// A closing fence uses the opening character at least as many times. An
/// unclosed block runs to the end of the text.
pub fn scan_fences(markdown: &str) -> Vec<Fence> {
    let mut fences = Vec::new();
    let mut open: Option<(char, usize, Fence)> = None;

    for (index, line) in markdown.lines().enumerate() {
        match open.take() {
            None => {
                if let Some(caps) = OPEN_RE.captures(line) {
                    let marker = &caps[1];
                    let fence_char = marker.chars().next().unwrap_or('`');
                    open = Some((
                        fence_char,
                        marker.len(),
                        Fence {
                            info: caps[2].trim().to_string(),
                            code: String::new(),
                            line: index + 1,
                        },
                    ));
                }
            }
            Some((fence_char, width, mut fence)) => {
                if closes(line, fence_char, width) {
                    fences.push(fence);
                } else {
                    fence.code.push_str(line);
                    fence.code.push('\n');
                    open = Some((fence_char, width, fence));
                }
            }
        }
    }

    if let Some((_, _, fence)) = open {
        fences.push(fence);
    }
    fences
}

fn closes(line: &str, fence_char: char, width: usize) -> bool {
    CLOSE_RE.captures(line).is_some_and(|caps| {
        let marker = &caps[1];
        marker.len() >= width && marker.chars().all(|c| c == fence_char)
    })
}

/// Drop everything after the interpreter name in backtick fence info strings,
/// so `` ```bash#setup:x `` becomes `` ```bash ``.
pub fn strip_info_tags(markdown: &str) -> String {
    INFO_TAGS_RE.replace_all(markdown, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_backtick_blocks_with_info() {
        let doc = "```env\na=b\n```\n```bash#test1\nls\n```\n\n```bash#test2\nls -al\n```";
        let fences = scan_fences(doc);
        assert_eq!(fences.len(), 3);
        assert_eq!(fences[0].info, "env");
        assert_eq!(fences[0].code, "a=b\n");
        assert_eq!(fences[1].info, "bash#test1");
        assert_eq!(fences[1].code, "ls\n");
        assert_eq!(fences[2].code, "ls -al\n");
        assert_eq!(fences[2].line, 8);
    }

    #[test]
    fn inline_backticks_are_not_fences() {
        let doc = "bash#test\nls\n```\n\n```bash#test\nls -al\n```";
        let fences = scan_fences(doc);
        // The bare ``` opens an untagged block; a tagged fence line cannot close it.
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].info, "");
        assert_eq!(fences[0].code, "\n```bash#test\nls -al\n");
        let doc = "- Test ```bash:me\ntext";
        assert!(scan_fences(doc).is_empty());
    }

    #[test]
    fn closing_fence_must_match_char_and_width() {
        let doc = "````python\nprint('```')\n```\n~~~\n````\n";
        let fences = scan_fences(doc);
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].code, "print('```')\n```\n~~~\n");
    }

    #[test]
    fn unclosed_block_runs_to_end() {
        let fences = scan_fences("~~~bash\necho hi\n");
        assert_eq!(fences.len(), 1);
        assert_eq!(fences[0].code, "echo hi\n");
    }

    #[test]
    fn strips_tags_from_info_strings() {
        let doc = "```env\na=b\n```\nyes\n```bash#test1\nls\n```\n\n- Test ```bash:me\n\n```bash (\\/me^) {&}_[2=']-$%!*:test2\nls -al\n```";
        let expect = "```env\na=b\n```\nyes\n```bash\nls\n```\n\n- Test ```bash:me\n\n```bash (\\/me^) {&}_[2=']-$%!*\nls -al\n```";
        assert_eq!(strip_info_tags(doc), expect);
    }
}
