//! End-to-end tests for the `docmend` binary.
//!
//! Each test runs the compiled binary in a temporary directory with
//! `--color never`, so output assertions see plain text. Tests that should
//! not depend on ambient configuration pass `--no-config`; the discovery
//! test builds its own invocation.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DIRTY: &str = "## ConsiderationsThe text continues\n";
const CLEANED: &str = "## Considerations\n\nThe text continues\n";

const GUIDE: &str = "# Service Guide\n\n## Install\n\nOld steps.\n";
const GUIDE_PATCHED: &str = "# Service Guide\n\n## Install\nNew steps.\n";
const UPDATE_INSTALL: &str =
    r#"[{"targetPath": "guide.md", "updateType": "UPDATE", "section": "Install", "text": "New steps."}]"#;

fn docmend(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("docmend").expect("docmend binary should build");
    cmd.current_dir(workdir).args(["--color", "never", "--no-config"]);
    cmd
}

fn setup_doc(content: &str) -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp.path().join("doc.md"), content).expect("Failed to write doc.md");
    temp
}

fn setup_guide() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp.path().join("guide.md"), GUIDE).expect("Failed to write guide.md");
    fs::write(temp.path().join("proposals.json"), UPDATE_INSTALL).expect("Failed to write proposals");
    temp
}

#[test]
fn test_version_command() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    docmend(temp.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("docmend "));
}

#[test]
fn test_no_arguments_shows_usage() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    Command::cargo_bin("docmend")
        .expect("docmend binary should build")
        .current_dir(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_clean_explicit_file_prints_content() {
    let temp = setup_doc(DIRTY);

    docmend(temp.path())
        .args(["clean", "doc.md"])
        .assert()
        .success()
        .stdout(CLEANED);

    // Printing never touches the file.
    let on_disk = fs::read_to_string(temp.path().join("doc.md")).expect("doc should still exist");
    assert_eq!(on_disk, DIRTY, "clean without --write must not modify the file");
}

#[test]
fn test_clean_check_flags_dirty_file() {
    let temp = setup_doc(DIRTY);

    docmend(temp.path())
        .args(["clean", "--check", "doc.md"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("doc.md: would clean"))
        .stdout(predicate::str::contains("1 of 1 files would be cleaned"));
}

#[test]
fn test_clean_check_passes_clean_file() {
    let temp = setup_doc("# Title\n\nNothing to fix here.\n");

    docmend(temp.path())
        .args(["clean", "--check", "doc.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 of 1 files would be cleaned"));
}

#[test]
fn test_clean_write_rewrites_in_place() {
    let temp = setup_doc(DIRTY);

    docmend(temp.path())
        .args(["clean", "--write", "doc.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("doc.md: cleaned"))
        .stdout(predicate::str::contains("Cleaned 1 of 1 files"));

    let on_disk = fs::read_to_string(temp.path().join("doc.md")).expect("doc should still exist");
    assert_eq!(on_disk, CLEANED);

    // A second pass finds nothing left to do.
    docmend(temp.path())
        .args(["clean", "--write", "doc.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleaned 0 of 1 files"));
}

#[test]
fn test_clean_diff_output() {
    let temp = setup_doc(DIRTY);

    docmend(temp.path())
        .args(["clean", "--diff", "doc.md"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("--- doc.md"))
        .stdout(predicate::str::contains("+++ doc.md (cleaned)"))
        .stdout(predicate::str::contains("@@"))
        .stdout(predicate::str::contains("-## ConsiderationsThe text continues"))
        .stdout(predicate::str::contains("+## Considerations"));
}

#[test]
fn test_clean_missing_path_is_a_tool_error() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    docmend(temp.path())
        .args(["clean", "no-such-file.md"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn test_clean_directory_defaults_to_check_mode() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let docs = temp.path().join("docs");
    fs::create_dir(&docs).expect("Failed to create docs dir");
    fs::write(docs.join("a.md"), DIRTY).expect("Failed to write a.md");
    fs::write(docs.join("notes.txt"), "plain text\n").expect("Failed to write notes.txt");

    // Directory targets never stream content to stdout; they report instead.
    docmend(temp.path())
        .args(["clean", "docs"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("would clean"))
        .stdout(predicate::str::contains("1 of 1 files would be cleaned"));

    let on_disk = fs::read_to_string(docs.join("a.md")).expect("a.md should still exist");
    assert_eq!(on_disk, DIRTY, "check mode must not modify files");
}

#[test]
fn test_clean_stdin_round_trip() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    docmend(temp.path())
        .args(["clean", "-"])
        .write_stdin(DIRTY)
        .assert()
        .success()
        .stdout(CLEANED);
}

#[test]
fn test_clean_stdin_check_flags_dirty_input() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    docmend(temp.path())
        .args(["clean", "--stdin", "--check"])
        .write_stdin(DIRTY)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("stdin.md: would clean"));
}

#[test]
fn test_clean_stdin_rejects_write() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    docmend(temp.path())
        .args(["clean", "--stdin", "--write"])
        .write_stdin(DIRTY)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--write cannot be used with stdin"));
}

#[test]
fn test_discovered_config_and_isolated_override() {
    let temp = setup_doc(DIRTY);
    fs::write(temp.path().join(".docmend.toml"), "[global]\ndisable = [\"all\"]\n")
        .expect("Failed to write config");

    // The discovered config turns every processor off, so nothing is dirty.
    Command::cargo_bin("docmend")
        .expect("docmend binary should build")
        .current_dir(temp.path())
        .args(["--color", "never", "clean", "--check", "doc.md"])
        .assert()
        .success()
        .stderr(predicate::str::contains("every processor is disabled"))
        .stdout(predicate::str::contains("0 of 1 files would be cleaned"));

    // --isolated ignores the file and runs the full pipeline.
    Command::cargo_bin("docmend")
        .expect("docmend binary should build")
        .current_dir(temp.path())
        .args(["--color", "never", "clean", "--check", "--isolated", "doc.md"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("1 of 1 files would be cleaned"));
}

#[test]
fn test_clean_disable_flag_narrows_the_pipeline() {
    let temp = setup_doc(DIRTY);

    // The glue fix lives in markdown-format; disabling it leaves the file as is.
    docmend(temp.path())
        .args(["clean", "--check", "--disable", "markdown-format", "doc.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 of 1 files would be cleaned"));
}

#[test]
fn test_apply_updates_target_file() {
    let temp = setup_guide();

    docmend(temp.path())
        .args(["apply", "proposals.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("guide.md: proposal 0 UPDATE applied"))
        .stdout(predicate::str::contains("1 applied, 0 skipped, 0 failed"));

    let on_disk = fs::read_to_string(temp.path().join("guide.md")).expect("guide should still exist");
    assert_eq!(on_disk, GUIDE_PATCHED);
}

#[test]
fn test_apply_reads_proposals_from_stdin() {
    let temp = setup_guide();

    docmend(temp.path())
        .args(["apply", "-"])
        .write_stdin(UPDATE_INSTALL)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 applied, 0 skipped, 0 failed"));

    let on_disk = fs::read_to_string(temp.path().join("guide.md")).expect("guide should still exist");
    assert_eq!(on_disk, GUIDE_PATCHED);
}

#[test]
fn test_apply_dry_run_keeps_stdout_pipeable() {
    let temp = setup_guide();

    // Patched document on stdout, status reporting on stderr, disk untouched.
    docmend(temp.path())
        .args(["apply", "--dry-run", "proposals.json"])
        .assert()
        .success()
        .stdout(GUIDE_PATCHED)
        .stderr(predicate::str::contains("1 applied, 0 skipped, 0 failed"));

    let on_disk = fs::read_to_string(temp.path().join("guide.md")).expect("guide should still exist");
    assert_eq!(on_disk, GUIDE, "--dry-run must not modify the file");
}

#[test]
fn test_apply_missing_section_fails() {
    let temp = setup_guide();
    fs::write(
        temp.path().join("proposals.json"),
        r#"[{"targetPath": "guide.md", "updateType": "UPDATE", "section": "Uninstall", "text": "x"}]"#,
    )
    .expect("Failed to write proposals");

    docmend(temp.path())
        .args(["apply", "proposals.json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed"))
        .stdout(predicate::str::contains("0 applied, 0 skipped, 1 failed"));

    let on_disk = fs::read_to_string(temp.path().join("guide.md")).expect("guide should still exist");
    assert_eq!(on_disk, GUIDE, "a failed proposal must not half-apply");
}

#[test]
fn test_apply_missing_target_file_fails_soft() {
    let temp = setup_guide();
    fs::write(
        temp.path().join("proposals.json"),
        r#"[{"targetPath": "absent.md", "updateType": "UPDATE", "section": "Install", "text": "x"},
            {"targetPath": "guide.md", "updateType": "UPDATE", "section": "Install", "text": "New steps."}]"#,
    )
    .expect("Failed to write proposals");

    // The bad target fails; the good one still lands.
    docmend(temp.path())
        .args(["apply", "proposals.json"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("1 applied, 0 skipped, 1 failed"));

    let on_disk = fs::read_to_string(temp.path().join("guide.md")).expect("guide should still exist");
    assert_eq!(on_disk, GUIDE_PATCHED);
}

#[test]
fn test_apply_json_report() {
    let temp = setup_guide();

    let output = docmend(temp.path())
        .args(["apply", "--json", "proposals.json"])
        .output()
        .expect("Failed to execute docmend");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("--json output should be valid JSON");
    assert_eq!(report["summary"]["applied"], 1);
    assert_eq!(report["summary"]["failed"], 0);
    assert_eq!(report["proposals"][0]["status"], "applied");
    assert_eq!(report["proposals"][0]["targetPath"], "guide.md");
    assert_eq!(report["files"][0]["written"], true);
}

#[test]
fn test_apply_invalid_json_is_a_tool_error() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(temp.path().join("proposals.json"), "not json at all").expect("Failed to write proposals");

    docmend(temp.path())
        .args(["apply", "proposals.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid proposals JSON"));
}

#[test]
fn test_processors_command_lists_registry() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    docmend(temp.path())
        .arg("processors")
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered processors:"))
        .stdout(predicate::str::contains("html-to-markdown"))
        .stdout(predicate::str::contains("markdown-format"))
        .stdout(predicate::str::contains("list-format"))
        .stdout(predicate::str::contains("code-block-format"))
        .stdout(predicate::str::contains("[enabled]"));
}

#[test]
fn test_processors_command_shows_disabled_state() {
    let temp = TempDir::new().expect("Failed to create temp dir");
    fs::write(
        temp.path().join(".docmend.toml"),
        "[global]\ndisable = [\"html-to-markdown\"]\n",
    )
    .expect("Failed to write config");

    Command::cargo_bin("docmend")
        .expect("docmend binary should build")
        .current_dir(temp.path())
        .args(["--color", "never", "processors"])
        .assert()
        .success()
        .stdout(predicate::str::contains("html-to-markdown - Rewrite embedded HTML into Markdown for Markdown-family targets [disabled]"));
}

#[test]
fn test_init_writes_template_and_refuses_overwrite() {
    let temp = TempDir::new().expect("Failed to create temp dir");

    docmend(temp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created default configuration file: .docmend.toml"));

    let written = fs::read_to_string(temp.path().join(".docmend.toml")).expect("config should exist");
    assert!(written.contains("[global]"), "template should carry a [global] table");

    docmend(temp.path())
        .arg("init")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}
