use std::io::Write;

use predicates::prelude::*;

const SAMPLE_DIFF: &str = "\
diff --git a/foo.txt b/foo.txt
--- a/foo.txt
+++ b/foo.txt
@@ -1,2 +1,3 @@
+one
+two
+three
-old
-older
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -10 +10 @@
-fn a() {}
+fn b() {}
";

/// Test that `branchline --help` shows usage information.
#[test]
fn test_help_flag() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Live git branch and diff stats dashboard"));
}

/// Text diffstat from stdin lists each file and a total line.
#[test]
fn test_diffstat_stdin_text() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.args(["diffstat", "--input", "-"]).write_stdin(SAMPLE_DIFF);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("foo.txt     +3 -2 ~5"))
        .stdout(predicate::str::contains("src/lib.rs  +1 -1 ~2"))
        .stdout(predicate::str::contains("2 file(s) changed, +4 -3"));
}

/// JSON diffstat is keyed by path.
#[test]
fn test_diffstat_stdin_json() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.args(["diffstat", "--input", "-", "--json"])
        .write_stdin(SAMPLE_DIFF);
    let output = cmd.assert().success().get_output().stdout.clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["foo.txt"]["added"], 3);
    assert_eq!(value["foo.txt"]["removed"], 2);
    assert_eq!(value["foo.txt"]["modified"], 5);
    assert_eq!(value["src/lib.rs"]["modified"], 2);
}

#[test]
fn test_diffstat_file_input() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE_DIFF.as_bytes()).unwrap();
    file.flush().unwrap();

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.args(["diffstat", "--input"]).arg(file.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("foo.txt"));
}

/// A missing input file is an error, not an empty result.
#[test]
fn test_diffstat_missing_file() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.args(["diffstat", "--input", "/definitely/not/here.diff"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open"));
}

#[test]
fn test_diffstat_invalid_utf8_fails() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.args(["diffstat", "--input", "-"])
        .write_stdin(b"+++ b/x.rs\n+\xff\n".to_vec());
    cmd.assert().failure();
}

/// Outside a repository `branch` prints an empty line and still succeeds.
#[test]
fn test_branch_outside_repo() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.arg("branch").current_dir(dir.path());
    cmd.assert().success().stdout("\n");
}

/// `watch` outside a repository prints the one-off snapshot and exits.
#[test]
fn test_watch_outside_repo_exits() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.args(["watch", "--json"]).current_dir(dir.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"branch\":\"\""))
        .stderr(predicate::str::contains("unavailable"));
}

/// Test that an unknown subcommand produces an error.
#[test]
fn test_unknown_subcommand() {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("branchline");
    cmd.arg("foobar");
    cmd.assert().failure();
}
