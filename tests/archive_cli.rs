//! End-to-end coverage of the `archive`/`unarchive` subcommands: a backup
//! folder compressed and encrypted, then decrypted and decompressed back
//! into an equivalent tree.

use assert_cmd::Command;

#[test]
fn archive_then_unarchive_round_trips_an_encrypted_folder() {
    let folder = tempfile::tempdir().unwrap();
    std::fs::write(folder.path().join("notes.txt"), b"keep this safe").unwrap();
    std::fs::create_dir(folder.path().join("nested")).unwrap();
    std::fs::write(folder.path().join("nested").join("inner.txt"), b"nested data").unwrap();

    Command::cargo_bin("snapkeep")
        .unwrap()
        .arg("archive")
        .arg(folder.path())
        .args(["--password", "hunter2"])
        .assert()
        .success();

    let archive_path = folder.path().with_extension("zip.enc");
    assert!(archive_path.exists(), "expected {} to exist", archive_path.display());

    let destination = tempfile::tempdir().unwrap();
    Command::cargo_bin("snapkeep")
        .unwrap()
        .arg("unarchive")
        .arg(&archive_path)
        .arg(destination.path())
        .args(["--password", "hunter2"])
        .assert()
        .success();

    assert_eq!(
        std::fs::read(destination.path().join("notes.txt")).unwrap(),
        b"keep this safe"
    );
    assert_eq!(
        std::fs::read(destination.path().join("nested").join("inner.txt")).unwrap(),
        b"nested data"
    );
}

#[test]
fn unarchive_with_wrong_password_fails_cleanly() {
    let folder = tempfile::tempdir().unwrap();
    std::fs::write(folder.path().join("secret.txt"), b"top secret").unwrap();

    Command::cargo_bin("snapkeep")
        .unwrap()
        .arg("archive")
        .arg(folder.path())
        .args(["--password", "right-password"])
        .assert()
        .success();

    let archive_path = folder.path().with_extension("zip.enc");
    let destination = tempfile::tempdir().unwrap();

    Command::cargo_bin("snapkeep")
        .unwrap()
        .arg("unarchive")
        .arg(&archive_path)
        .arg(destination.path())
        .args(["--password", "wrong-password"])
        .assert()
        .failure();
}
