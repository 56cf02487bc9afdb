//! End-to-end tests for the `cs` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cs(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cs").expect("cs binary should build");
    cmd.arg("--dir").arg(dir.path());
    cmd
}

#[test]
fn test_set_then_get() {
    let dir = TempDir::new().unwrap();

    cs(&dir).args(["set", "theme", "dark"]).assert().success();

    cs(&dir)
        .args(["get", "theme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dark\""));
}

#[test]
fn test_get_missing_key_fails() {
    let dir = TempDir::new().unwrap();

    cs(&dir)
        .args(["get", "nothing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No value for key"));
}

#[test]
fn test_desktop_items_are_merged_with_drag_positions() {
    let dir = TempDir::new().unwrap();

    cs(&dir)
        .args(["set", "desktop_items", r#"[{"id":"a","x":1,"y":2},{"id":"b"}]"#])
        .assert()
        .success();
    cs(&dir).args(["coords", "a", "40.9", "-12"]).assert().success();

    cs(&dir)
        .args(["get", "desktop_items"])
        .assert()
        .success()
        .stdout(predicate::str::contains("40").and(predicate::str::contains("-12")));

    cs(&dir)
        .arg("layout")
        .assert()
        .success()
        .stdout(predicate::str::contains("40,-12"));
}

#[test]
fn test_read_unknown_file_fails() {
    let dir = TempDir::new().unwrap();

    cs(&dir).args(["read", "missing.txt"]).assert().failure();
}
