//! CLI tests for the document inspection commands and `init-config`.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;

use rundoc::exit_codes;
use rundoc::io::config::{RundocConfig, load_config};
use rundoc::test_support::write_doc;

const TAGGED_DOC: &str = "# Guide\n\n```env\na=b\n```\n\n```bash#test1\nls\n```\n\n```bash#test2#test1\nls -al\n```\n\n```sh#test2\necho 1\n```\n";

fn rundoc(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rundoc"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn rundoc")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn list_tags_prints_counts_most_frequent_first() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_doc(temp.path(), "guide.md", TAGGED_DOC);

    let output = rundoc(temp.path(), &["list-tags", "guide.md"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "bash\t2", "test1\t2", "test2\t2", "env\t1", "sh\t1"
        ]
    );
}

#[test]
fn list_blocks_prints_selected_blocks_as_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_doc(temp.path(), "guide.md", TAGGED_DOC);

    let output = rundoc(temp.path(), &["list-blocks", "guide.md", "-t", "test1"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let listing: Value = serde_json::from_str(&stdout(&output)).expect("json listing");
    let blocks = listing["code_blocks"].as_array().expect("blocks");
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0]["code"], "ls\n");
    assert_eq!(blocks[1]["tags"], serde_json::json!(["bash", "test2", "test1"]));
    assert_eq!(listing["env"]["a"], "b");
}

#[test]
fn list_blocks_honours_must_not_have_tags() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_doc(temp.path(), "guide.md", TAGGED_DOC);

    let output = rundoc(
        temp.path(),
        &["list-blocks", "guide.md", "-t", "test1", "-N", "test2"],
    );

    let listing: Value = serde_json::from_str(&stdout(&output)).expect("json listing");
    assert_eq!(listing["code_blocks"].as_array().map(Vec::len), Some(1));
}

#[test]
fn list_blocks_pretty_numbers_each_block() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_doc(temp.path(), "guide.md", TAGGED_DOC);

    let output = rundoc(
        temp.path(),
        &["list-blocks", "guide.md", "-T", "test2", "--pretty"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let out = stdout(&output);
    assert!(out.contains("1. [bash] bash#test2#test1"), "{out}");
    assert!(out.contains("2. [sh] sh#test2"), "{out}");
    assert!(out.contains("echo 1"));
}

#[test]
fn clean_doc_strips_tags_from_fences() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_doc(
        temp.path(),
        "guide.md",
        "Intro\n\n```bash#setup#db\nls\n```\n\n```create-file:/tmp/x:600\nhi\n```\n",
    );

    let output = rundoc(temp.path(), &["clean-doc", "guide.md"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        stdout(&output),
        "Intro\n\n```bash\nls\n```\n\n```create-file\nhi\n```\n"
    );
}

#[test]
fn missing_document_is_invalid_input() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = rundoc(temp.path(), &["list-tags", "absent.md"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.md"));
}

#[test]
fn init_config_writes_defaults_and_refuses_to_overwrite() {
    let temp = tempfile::tempdir().expect("tempdir");

    let first = rundoc(temp.path(), &["init-config"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("rundoc.toml")).expect("load config");
    assert_eq!(cfg, RundocConfig::default());

    let second = rundoc(temp.path(), &["init-config"]);
    assert_eq!(second.status.code(), Some(exit_codes::INVALID));

    let forced = rundoc(temp.path(), &["init-config", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn explicit_config_must_exist() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_doc(temp.path(), "guide.md", TAGGED_DOC);

    let output = rundoc(
        temp.path(),
        &["--config", "missing.toml", "list-tags", "guide.md"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn config_separator_applies_to_documents() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_doc(temp.path(), "guide.md", "```bash+alpha\nls\n```\n");
    write_doc(temp.path(), "custom.toml", "[document]\ntag_separator = \"+\"\n");

    let output = rundoc(
        temp.path(),
        &["--config", "custom.toml", "list-tags", "guide.md"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&output), "bash\t1\nalpha\t1\n");
}
