//! End-to-end CLI integration tests: spawns the real `rwm` binary, pipes
//! JSONL requests to stdin, and checks the JSON responses on stdout.

use assert_cmd::Command;
use predicates::prelude::*;

fn rwm_in(root: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("rwm").expect("binary `rwm` should be built");
    cmd.arg("--root").arg(root);
    cmd
}

#[test]
fn help_exits_zero_and_documents_the_cli_flags() {
    let dir = tempfile::tempdir().unwrap();
    rwm_in(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("bundleTokens"))
        .stdout(predicate::str::contains("modelFamily"));
}

#[test]
fn a_commit_then_resume_round_trips_through_the_real_binary() {
    let dir = tempfile::tempdir().unwrap();
    let input = concat!(
        r#"{"op":"memory_commit","session_id":"proj@main","task":"ship the CLI"}"#, "\n",
        r#"{"op":"memory_resume","session_id":"proj@main"}"#, "\n",
    );

    let assert = rwm_in(dir.path()).write_stdin(input).assert().success();
    let output = assert.get_output();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);

    let commit_resp: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(commit_resp["error"], false);

    let resume_resp: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(resume_resp["error"], false);
    assert!(resume_resp["text"].as_str().unwrap().contains("ship the CLI"));
}

#[test]
fn a_malformed_request_line_yields_an_error_response_without_killing_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let input = concat!(
        "not json at all\n",
        r#"{"op":"memory_resume","session_id":"proj@main"}"#, "\n",
    );

    let assert = rwm_in(dir.path()).write_stdin(input).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["error"], true);

    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["error"], false);
}

#[test]
fn an_unresolvable_root_exits_with_the_init_error_code() {
    let assert = rwm_in(std::path::Path::new("/does/not/exist/anywhere")).assert();
    assert.failure().code(1);
}
