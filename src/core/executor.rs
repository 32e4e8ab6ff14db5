//! The backup executor: walks a source tree, decides what needs copying,
//! writes the destination folder and the catalog manifest.
//!
//! State machine: `Validate -> ResolveReference -> MaterializeFolder ->
//! Walk -> Finalize`, with cancellation reachable from `Walk` at any
//! per-file boundary.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use crossbeam_channel::Sender;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::core::catalog::{Catalog, CatalogError};
use crate::core::change_detector;
use crate::core::model::{
    generate_backup_folder_name, BackupMode, ManifestEntry, Session, SessionStatus,
};
use crate::core::progress::ProgressEvent;

/// Flush the pending counter/manifest batch to the catalog every this many files.
const FLUSH_EVERY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("source does not exist: {0}")]
    SourceMissing(PathBuf),
    #[error("source and destination must differ: {0}")]
    SourceEqualsDestination(PathBuf),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("failed to create backup folder {path}: {source}")]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The outcome of one backup invocation, returned to the caller (CLI or
/// scheduler) after the executor's `Finalize` step.
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub session_id: i64,
    pub effective_mode: BackupMode,
    pub backup_folder: String,
    pub status: SessionStatus,
    pub files_total: u64,
    pub files_copied: u64,
    pub files_skipped: u64,
    pub bytes_copied: u64,
    pub error_message: Option<String>,
}

/// Shared cooperative-cancellation flag. Checked between files; a single
/// file's hash/copy is never interrupted mid-flight.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run one backup: validate, resolve the reference session (promoting to
/// full if the chain is broken), materialize the destination folder, walk
/// the source tree, and finalize the catalog session.
pub fn run_backup(
    catalog: &mut Catalog,
    source: &Path,
    destination: &Path,
    declared_mode: BackupMode,
    progress: &Sender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<BackupOutcome, BackupError> {
    // --- Validate ---
    if !source.exists() {
        return Err(BackupError::SourceMissing(source.to_path_buf()));
    }
    let source_canon = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    let dest_canon = destination
        .canonicalize()
        .unwrap_or_else(|_| destination.to_path_buf());
    if source_canon == dest_canon {
        return Err(BackupError::SourceEqualsDestination(source.to_path_buf()));
    }

    let source_key = source.to_string_lossy().to_string();
    let dest_key = destination.to_string_lossy().to_string();

    // --- ResolveReference ---
    let (effective_mode, reference) =
        resolve_reference(catalog, &source_key, destination, declared_mode)?;

    let reference_files = match &reference {
        Some(session) => Some(catalog.get_session_files(session.id)?),
        None => None,
    };

    // --- MaterializeFolder ---
    let now = Local::now();
    let folder_name = unique_folder_name(destination, generate_backup_folder_name(effective_mode, now));
    let backup_folder_path = destination.join(&folder_name);
    std::fs::create_dir_all(&backup_folder_path).map_err(|source| BackupError::CreateFolder {
        path: backup_folder_path.clone(),
        source,
    })?;

    let session_id = catalog.create_session(&source_key, &dest_key, effective_mode, &folder_name)?;
    info!(session_id, folder = %folder_name, mode = %effective_mode, "backup session started");

    // --- Walk ---
    let entries: Vec<PathBuf> = WalkDir::new(source)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    let files_total = entries.len() as u64;
    catalog.update_session_progress(session_id, Some(files_total as i64), None, None, None)?;
    let _ = progress.send(ProgressEvent::Counts {
        files_total,
        files_processed: 0,
        files_copied: 0,
        files_skipped: 0,
        bytes_copied: 0,
    });

    if effective_mode == BackupMode::Full {
        for dir in WalkDir::new(source)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir())
        {
            if let Ok(rel) = dir.path().strip_prefix(source) {
                if !rel.as_os_str().is_empty() {
                    let _ = std::fs::create_dir_all(backup_folder_path.join(rel));
                }
            }
        }
    }

    let mut files_processed: u64 = 0;
    let mut files_copied: u64 = 0;
    let mut files_skipped: u64 = 0;
    let mut bytes_copied: u64 = 0;
    let mut pending_manifest: Vec<ManifestEntry> = Vec::new();
    let mut cancelled = false;

    for source_file in &entries {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let relative_path = match source_file.strip_prefix(source) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        let _ = progress.send(ProgressEvent::FileStarted {
            relative_path: relative_path.clone(),
        });

        match process_one_file(
            source_file,
            &relative_path,
            effective_mode,
            reference_files.as_ref(),
            &backup_folder_path,
        ) {
            Ok(Some((entry, copied, size))) => {
                files_processed += 1;
                if copied {
                    files_copied += 1;
                    bytes_copied += size;
                } else {
                    files_skipped += 1;
                }
                pending_manifest.push(entry);
            }
            Ok(None) => {
                // Could not stat/hash the file at all: skip without a manifest entry.
                files_processed += 1;
                files_skipped += 1;
                warn!(path = %source_file.display(), "skipping unreadable file");
            }
            Err(err) => {
                files_processed += 1;
                files_skipped += 1;
                warn!(path = %source_file.display(), error = %err, "per-file backup error, skipping");
            }
        }

        if pending_manifest.len() >= FLUSH_EVERY {
            catalog.store_file_hashes_batch(session_id, &pending_manifest)?;
            pending_manifest.clear();
            catalog.update_session_progress(
                session_id,
                None,
                Some(files_copied as i64),
                Some(files_skipped as i64),
                Some(bytes_copied as i64),
            )?;
            let _ = progress.send(ProgressEvent::Counts {
                files_total,
                files_processed,
                files_copied,
                files_skipped,
                bytes_copied,
            });
        }
    }

    // --- Finalize ---
    if !pending_manifest.is_empty() {
        catalog.store_file_hashes_batch(session_id, &pending_manifest)?;
    }
    catalog.update_session_progress(
        session_id,
        Some(files_total as i64),
        Some(files_copied as i64),
        Some(files_skipped as i64),
        Some(bytes_copied as i64),
    )?;

    let status = if cancelled {
        SessionStatus::Cancelled
    } else {
        SessionStatus::Completed
    };
    catalog.complete_session(session_id, status, None)?;

    let _ = progress.send(ProgressEvent::Done {
        success: status == SessionStatus::Completed,
        error: None,
    });
    info!(session_id, %status, files_copied, files_skipped, "backup session finished");

    Ok(BackupOutcome {
        session_id,
        effective_mode,
        backup_folder: folder_name,
        status,
        files_total,
        files_copied,
        files_skipped,
        bytes_copied,
        error_message: None,
    })
}

/// Resolve the reference session for `declared_mode`, promoting to full
/// when incremental/differential was requested but no valid anchor is
/// physically present under `destination`.
fn resolve_reference(
    catalog: &Catalog,
    source_key: &str,
    destination: &Path,
    declared_mode: BackupMode,
) -> Result<(BackupMode, Option<Session>), BackupError> {
    let candidate = match declared_mode {
        BackupMode::Full => None,
        BackupMode::Incremental => catalog.get_last_session(source_key, None)?,
        BackupMode::Differential => catalog.get_last_session(source_key, Some(BackupMode::Full))?,
    };

    let Some(candidate) = candidate else {
        if declared_mode != BackupMode::Full {
            warn!(mode = %declared_mode, "no reference session on record, promoting to full");
        }
        return Ok((BackupMode::Full, None));
    };

    let folder_present = candidate
        .backup_folder
        .as_ref()
        .map(|name| destination.join(name).is_dir())
        .unwrap_or(false);

    if folder_present {
        Ok((declared_mode, Some(candidate)))
    } else {
        warn!(
            session_id = candidate.id,
            "reference backup folder missing from disk, promoting to full"
        );
        Ok((BackupMode::Full, None))
    }
}

/// Disambiguate a same-minute folder-name collision by appending `-2`,
/// `-3`, ... until a free path under `destination` is found.
fn unique_folder_name(destination: &Path, base: String) -> String {
    if !destination.join(&base).exists() {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !destination.join(&candidate).exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Decide and (if needed) execute the copy for a single file. Returns the
/// manifest entry plus whether bytes were actually copied and the file's
/// size, or `None` if the file could not be read at all (stat/hash failure
/// on both the quick path and the fallback).
fn process_one_file(
    source_file: &Path,
    relative_path: &str,
    mode: BackupMode,
    reference_files: Option<&std::collections::HashMap<String, ManifestEntry>>,
    backup_folder_path: &Path,
) -> anyhow::Result<Option<(ManifestEntry, bool, u64)>> {
    let decision = match change_detector::decide(source_file, relative_path, mode, reference_files) {
        Ok(d) => d,
        Err(_) => return Ok(None),
    };

    let meta = match std::fs::metadata(source_file) {
        Ok(m) => m,
        Err(_) => return Ok(None),
    };
    let size = meta.len();
    let modified_at: chrono::DateTime<Local> = meta
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .into();

    let digest = match decision.current_hash {
        Some(h) => h,
        None => return Ok(None),
    };

    if decision.should_copy {
        let dest_path = backup_folder_path.join(relative_path);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source_file, &dest_path)?;
        crate::core::fs_util::preserve_metadata(source_file, &dest_path);
    }

    let entry = ManifestEntry {
        relative_path: relative_path.to_string(),
        file_hash: digest,
        file_size: size as i64,
        modified_at,
    };
    Ok(Some((entry, decision.should_copy, size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::Catalog;
    use tempfile::tempdir;

    fn progress_sink() -> Sender<ProgressEvent> {
        let (tx, _rx) = crate::core::progress::channel();
        tx
    }

    #[test]
    fn full_backup_copies_all_files() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"A").unwrap();
        std::fs::write(src.path().join("b.txt"), b"B").unwrap();

        let mut catalog = Catalog::open_in_memory().unwrap();
        let outcome = run_backup(
            &mut catalog,
            src.path(),
            dst.path(),
            BackupMode::Full,
            &progress_sink(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.effective_mode, BackupMode::Full);
        assert_eq!(outcome.files_copied, 2);
        assert_eq!(outcome.status, SessionStatus::Completed);
        assert!(dst.path().join(&outcome.backup_folder).join("a.txt").exists());
    }

    #[test]
    fn incremental_skips_unchanged_files() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"A").unwrap();
        std::fs::write(src.path().join("b.txt"), b"B").unwrap();

        let mut catalog = Catalog::open_in_memory().unwrap();
        run_backup(
            &mut catalog,
            src.path(),
            dst.path(),
            BackupMode::Full,
            &progress_sink(),
            &CancellationToken::new(),
        )
        .unwrap();

        std::fs::write(src.path().join("a.txt"), b"A2").unwrap();
        let outcome = run_backup(
            &mut catalog,
            src.path(),
            dst.path(),
            BackupMode::Incremental,
            &progress_sink(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.files_copied, 1);
        assert_eq!(outcome.files_skipped, 1);
        let manifest = catalog.get_session_files(outcome.session_id).unwrap();
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn differential_promotes_to_full_when_anchor_missing() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        std::fs::write(src.path().join("a.txt"), b"A").unwrap();

        let mut catalog = Catalog::open_in_memory().unwrap();
        let full = run_backup(
            &mut catalog,
            src.path(),
            dst.path(),
            BackupMode::Full,
            &progress_sink(),
            &CancellationToken::new(),
        )
        .unwrap();

        std::fs::remove_dir_all(dst.path().join(&full.backup_folder)).unwrap();

        let outcome = run_backup(
            &mut catalog,
            src.path(),
            dst.path(),
            BackupMode::Differential,
            &progress_sink(),
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.effective_mode, BackupMode::Full);
        assert_eq!(outcome.files_copied, 1);
    }

    #[test]
    fn cancellation_marks_session_cancelled() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(src.path().join(format!("f{i}.txt")), b"x").unwrap();
        }

        let mut catalog = Catalog::open_in_memory().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = run_backup(
            &mut catalog,
            src.path(),
            dst.path(),
            BackupMode::Full,
            &progress_sink(),
            &cancel,
        )
        .unwrap();

        assert_eq!(outcome.status, SessionStatus::Cancelled);
    }

    #[test]
    fn same_minute_collision_gets_disambiguated() {
        let dst = tempdir().unwrap();
        let base = generate_backup_folder_name(BackupMode::Full, Local::now());
        std::fs::create_dir_all(dst.path().join(&base)).unwrap();

        let unique = unique_folder_name(dst.path(), base.clone());
        assert_ne!(unique, base);
        assert_eq!(unique, format!("{base}-2"));
    }
}
