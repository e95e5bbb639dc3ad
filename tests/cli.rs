//! End-to-end tests driving the `blackbox` binary against scratch suites.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn blackbox() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_blackbox"));
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

/// Write a case that appends a line to `a.txt`, with the given expected contents.
fn write_case(suite: &Path, name: &str, expected: &str) {
    let case = suite.join(name);
    fs::create_dir_all(case.join("input")).unwrap();
    fs::create_dir_all(case.join("output")).unwrap();
    fs::write(
        case.join("config.yaml"),
        "command: \"echo ' more' >> a.txt\"\ntest_description: appends a line\n",
    )
    .unwrap();
    fs::write(case.join("input/a.txt"), "Hello chIcken\nBooya!").unwrap();
    fs::write(case.join("output/a.txt"), expected).unwrap();
}

const APPENDED: &str = "Hello chIcken\nBooya! more\n";

#[test]
fn passing_suite_exits_zero() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "append", APPENDED);

    blackbox()
        .arg("run")
        .arg(suite.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ append \"appends a line\""))
        .stdout(predicate::str::contains("1 passed, 0 failed"));

    assert!(!suite.path().join("append/working").exists());
}

#[test]
fn failing_suite_reports_differences() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "append", "Hello chIcken\nBooya!\n");

    blackbox()
        .arg("run")
        .arg(suite.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("✗ append"))
        .stdout(predicate::str::contains("* Size differs:"))
        .stdout(predicate::str::contains("= 26, "))
        .stdout(predicate::str::contains("= 21"))
        .stdout(predicate::str::contains("0 passed, 1 failed"));

    assert!(suite.path().join("append/working/a.txt").is_file());
}

#[test]
fn json_output_parses() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "a_pass", APPENDED);
    write_case(suite.path(), "b_fail", "nope");

    let output = blackbox()
        .args(["run", "--output", "json"])
        .arg(suite.path())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["passed"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["results"][0]["name"], "a_pass");
    assert_eq!(json["results"][1]["name"], "b_fail");
    assert_eq!(json["results"][1]["passed"], false);
}

#[test]
fn junit_output() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "append", APPENDED);

    blackbox()
        .args(["run", "-o", "junit"])
        .arg(suite.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("<?xml"))
        .stdout(predicate::str::contains("<testcase name=\"append\""))
        .stdout(predicate::str::contains("failures=\"0\""));
}

#[test]
fn filter_limits_cases() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "good", APPENDED);
    write_case(suite.path(), "broken", "nope");

    blackbox()
        .args(["run", "--filter", "goo"])
        .arg(suite.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 passed, 0 failed"))
        .stdout(predicate::str::contains("broken").not());
}

#[test]
fn run_cleans_stale_artifacts_first() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "append", APPENDED);
    let case = suite.path().join("append");
    fs::create_dir_all(case.join("working/leftover")).unwrap();
    fs::write(case.join("stdout_working.txt"), "old").unwrap();

    blackbox().arg("run").arg(suite.path()).assert().success();

    assert!(!case.join("working").exists());
    assert!(!case.join("stdout_working.txt").exists());
}

#[test]
fn clean_removes_working_dirs() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "append", "stale");
    let case = suite.path().join("append");
    fs::create_dir_all(case.join("working")).unwrap();
    fs::write(case.join("stdout_working.txt"), "x").unwrap();

    blackbox()
        .arg("clean")
        .arg(suite.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 1 working dir(s) and 1 stdout file(s)"));

    assert!(!case.join("working").exists());
    assert!(case.join("output/a.txt").is_file());
}

#[test]
fn record_then_run_passes() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "append", "outdated");

    blackbox().arg("run").arg(suite.path()).assert().code(1);

    blackbox()
        .arg("record")
        .arg(suite.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 recorded, 0 failed"));

    let case = suite.path().join("append");
    assert_eq!(fs::read_to_string(case.join("output/a.txt")).unwrap(), APPENDED);
    assert_eq!(fs::read_to_string(case.join("stdout.txt")).unwrap(), "");

    blackbox()
        .arg("run")
        .arg(suite.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 passed, 0 failed"));
}

#[test]
fn validate_reports_bad_cases() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "good", APPENDED);
    let bad = suite.path().join("bad");
    fs::create_dir_all(&bad).unwrap();
    fs::write(bad.join("config.yaml"), "test_description: no command\n").unwrap();

    blackbox()
        .arg("validate")
        .arg(suite.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("✓"))
        .stderr(predicate::str::contains("no command given"));
}

#[test]
fn validate_accepts_good_suite() {
    let suite = TempDir::new().unwrap();
    write_case(suite.path(), "good", APPENDED);

    blackbox()
        .arg("validate")
        .arg(suite.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("All 1 case(s) valid"));
}

#[test]
fn init_scaffolds_a_passing_case() {
    let suite = TempDir::new().unwrap();
    let case = suite.path().join("copy");

    blackbox()
        .arg("init")
        .arg(&case)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created:"));

    assert!(case.join("config.yaml").is_file());
    assert!(case.join("input").is_dir());
    assert!(case.join("output").is_dir());

    blackbox().arg("run").arg(suite.path()).assert().success();

    // Refuses to overwrite
    blackbox().arg("init").arg(&case).assert().code(1);
}

#[test]
fn schema_is_json() {
    let output = blackbox().arg("schema").output().unwrap();
    assert!(output.status.success());

    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(schema["properties"]["command"].is_object());
    assert!(schema["properties"]["text_input"].is_object());
}

#[test]
fn missing_suite_dir_fails() {
    let suite = TempDir::new().unwrap();

    blackbox()
        .arg("run")
        .arg(suite.path().join("nope"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("couldn't find test suite directory"));
}

#[test]
fn empty_suite_fails() {
    let suite = TempDir::new().unwrap();

    blackbox()
        .arg("run")
        .arg(suite.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No test cases found"));
}
