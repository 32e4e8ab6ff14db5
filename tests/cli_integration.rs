//! Smoke tests for the `snapkeep` binary's subcommands, sandboxed into a
//! temporary per-user config directory so a test run never touches the
//! developer's real `~/.config/snapkeep`.

use assert_cmd::Command;
use predicates::prelude::*;

fn sandboxed(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("snapkeep").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home);
    cmd
}

#[test]
fn help_lists_every_subcommand() {
    let mut cmd = Command::cargo_bin("snapkeep").unwrap();
    cmd.arg("--help");
    cmd.assert().success().stdout(
        predicate::str::contains("backup")
            .and(predicate::str::contains("restore"))
            .and(predicate::str::contains("schedule"))
            .and(predicate::str::contains("archive")),
    );
}

#[test]
fn init_writes_preferences_file() {
    let config_home = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();

    let mut cmd = sandboxed(config_home.path());
    cmd.args(["init", "--force"]).arg(target_dir.path());
    cmd.assert().success();

    assert!(target_dir.path().join("preferences.toml").exists());
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let config_home = tempfile::tempdir().unwrap();
    let target_dir = tempfile::tempdir().unwrap();

    sandboxed(config_home.path())
        .arg("init")
        .arg(target_dir.path())
        .assert()
        .success();

    sandboxed(config_home.path())
        .arg("init")
        .arg(target_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn dry_run_backup_reports_without_touching_the_catalog() {
    let config_home = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("a.txt"), b"A").unwrap();

    sandboxed(config_home.path())
        .args(["--dry-run", "backup"])
        .arg(source.path())
        .arg(destination.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("would run a full backup"));

    // No catalog should have been created under the sandboxed config dir.
    let entries = std::fs::read_dir(config_home.path()).map(|d| d.count()).unwrap_or(0);
    assert_eq!(entries, 0);
}

#[test]
fn backup_then_history_round_trips_through_the_cli() {
    let config_home = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("a.txt"), b"A").unwrap();

    sandboxed(config_home.path())
        .args(["backup", "--json"])
        .arg(source.path())
        .arg(destination.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"completed\""));

    sandboxed(config_home.path())
        .args(["history", "--json"])
        .arg(source.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"files_copied\": 1"));
}

#[test]
fn schedule_add_list_remove_round_trip() {
    let config_home = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();

    sandboxed(config_home.path())
        .args(["schedule", "add", "nightly"])
        .arg(source.path())
        .arg(destination.path())
        .args(["--frequency", "daily", "--hour", "2", "--minute", "30"])
        .assert()
        .success()
        .stdout(predicate::str::contains("schedule added"));

    let listing = sandboxed(config_home.path())
        .args(["schedule", "list", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(listing.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("\"name\": \"nightly\""));

    let id: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let id = id[0]["id"].as_str().unwrap().to_string();

    sandboxed(config_home.path())
        .args(["schedule", "remove", &id])
        .assert()
        .success();

    let after_removal = sandboxed(config_home.path())
        .args(["schedule", "list", "--json"])
        .assert()
        .success();
    let stdout = String::from_utf8(after_removal.get_output().stdout.clone()).unwrap();
    assert_eq!(stdout.trim(), "[]");
}
