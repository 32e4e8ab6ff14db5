//! End-to-end coverage of the backup/restore engine against a real
//! filesystem, exercising the full -> modify -> incremental -> restore
//! cycle and a broken-chain promotion-to-full.

use snapkeep::core::executor::{run_backup, CancellationToken};
use snapkeep::core::restore::run_restore;
use snapkeep::{BackupMode, Catalog};

fn progress_sink() -> crossbeam_channel::Sender<snapkeep::core::progress::ProgressEvent> {
    let (tx, _rx) = snapkeep::core::progress::channel();
    tx
}

#[test]
fn full_then_incremental_then_restore_reconstructs_latest_state() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let restore_to = tempfile::tempdir().unwrap();
    let catalog_path = dst.path().join("catalog.sqlite3");

    std::fs::write(src.path().join("config.yml"), b"v1").unwrap();
    std::fs::create_dir(src.path().join("docs")).unwrap();
    std::fs::write(src.path().join("docs").join("readme.md"), b"hello").unwrap();

    let mut catalog = Catalog::open(&catalog_path).unwrap();

    let full = run_backup(
        &mut catalog,
        src.path(),
        dst.path(),
        BackupMode::Full,
        &progress_sink(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(full.files_copied, 2);
    assert_eq!(full.files_skipped, 0);

    // Only one file changes between backups.
    std::fs::write(src.path().join("config.yml"), b"v2").unwrap();

    let incremental = run_backup(
        &mut catalog,
        src.path(),
        dst.path(),
        BackupMode::Incremental,
        &progress_sink(),
        &CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(incremental.effective_mode, BackupMode::Incremental);
    assert_eq!(incremental.files_copied, 1);
    assert_eq!(incremental.files_skipped, 1);

    // The incremental folder only physically contains config.yml...
    let incremental_folder = dst.path().join(&incremental.backup_folder);
    assert!(incremental_folder.join("config.yml").exists());
    assert!(!incremental_folder.join("docs").join("readme.md").exists());

    // ...but restoring it pulls readme.md from the full backup's folder.
    let result = run_restore(
        &catalog,
        &incremental_folder,
        restore_to.path(),
        &progress_sink(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(result.files_restored, 2);
    assert_eq!(result.files_unresolved, 0);
    assert!(!result.legacy);
    assert_eq!(
        std::fs::read(restore_to.path().join("config.yml")).unwrap(),
        b"v2"
    );
    assert_eq!(
        std::fs::read(restore_to.path().join("docs").join("readme.md")).unwrap(),
        b"hello"
    );
}

#[test]
fn differential_falls_back_to_full_when_reference_folder_is_gone() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let catalog_path = dst.path().join("catalog.sqlite3");
    std::fs::write(src.path().join("a.txt"), b"A").unwrap();

    let mut catalog = Catalog::open(&catalog_path).unwrap();
    let full = run_backup(
        &mut catalog,
        src.path(),
        dst.path(),
        BackupMode::Full,
        &progress_sink(),
        &CancellationToken::new(),
    )
    .unwrap();

    // Simulate the anchor folder being deleted out from under the catalog.
    std::fs::remove_dir_all(dst.path().join(&full.backup_folder)).unwrap();

    let differential = run_backup(
        &mut catalog,
        src.path(),
        dst.path(),
        BackupMode::Differential,
        &progress_sink(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(differential.effective_mode, BackupMode::Full);
    assert_eq!(differential.files_copied, 1);
}

#[test]
fn restoring_an_uncataloged_folder_copies_it_verbatim() {
    let orphan = tempfile::tempdir().unwrap();
    let restore_to = tempfile::tempdir().unwrap();
    let catalog_dir = tempfile::tempdir().unwrap();
    std::fs::write(orphan.path().join("loose.txt"), b"orphaned").unwrap();

    let catalog = Catalog::open(&catalog_dir.path().join("catalog.sqlite3")).unwrap();
    let result = run_restore(
        &catalog,
        orphan.path(),
        restore_to.path(),
        &progress_sink(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert!(result.legacy);
    assert_eq!(result.files_restored, 1);
}
