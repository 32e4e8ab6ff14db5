//! The restore resolver: given a backup folder, reconstructs a logical
//! snapshot into a destination directory by walking the chain of prior
//! sessions for the file bytes that weren't re-copied.
//!
//! Catalog-driven when the folder matches a known session, verbatim
//! copy otherwise.

use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use tracing::{info, warn};

use crate::core::catalog::{Catalog, CatalogError};
use crate::core::executor::CancellationToken;
use crate::core::model::Session;
use crate::core::progress::ProgressEvent;

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("backup folder does not exist: {0}")]
    FolderMissing(PathBuf),
    #[error("failed to create destination {path}: {source}")]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub files_restored: u64,
    pub files_unresolved: u64,
    pub unresolved_paths: Vec<String>,
    pub cancelled: bool,
    /// True when no catalog session matched and the folder was copied
    /// verbatim rather than resolved through the chain.
    pub legacy: bool,
}

/// Restore `backup_folder_path` into `destination`.
pub fn run_restore(
    catalog: &Catalog,
    backup_folder_path: &Path,
    destination: &Path,
    progress: &Sender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<RestoreOutcome, RestoreError> {
    if !backup_folder_path.is_dir() {
        return Err(RestoreError::FolderMissing(backup_folder_path.to_path_buf()));
    }
    std::fs::create_dir_all(destination).map_err(|source| RestoreError::CreateDestination {
        path: destination.to_path_buf(),
        source,
    })?;

    let folder_name = backup_folder_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match catalog.get_session_by_folder(&folder_name)? {
        Some(session) => catalog_driven_restore(catalog, &session, backup_folder_path, destination, progress, cancel),
        None => {
            warn!(folder = %folder_name, "no catalog session found, falling back to legacy verbatim restore");
            legacy_restore(backup_folder_path, destination, progress, cancel)
        }
    }
}

/// Reconstruct the logical snapshot of `session` by resolving each
/// manifest entry across the chain of sessions for its source, newest
/// first (the current session probed before any older one).
fn catalog_driven_restore(
    catalog: &Catalog,
    session: &Session,
    backup_folder_path: &Path,
    destination: &Path,
    progress: &Sender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<RestoreOutcome, RestoreError> {
    let manifest = catalog.get_session_files(session.id)?;
    let root_backup_dir = backup_folder_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| backup_folder_path.to_path_buf());

    let mut chain: Vec<Session> = vec![session.clone()];
    chain.extend(catalog.get_sessions_history(&session.source_path, Some(session.started_at))?);

    let files_total = manifest.len() as u64;
    let _ = progress.send(ProgressEvent::Counts {
        files_total,
        files_processed: 0,
        files_copied: 0,
        files_skipped: 0,
        bytes_copied: 0,
    });

    let mut files_restored = 0u64;
    let mut unresolved_paths = Vec::new();
    let mut files_processed = 0u64;
    let mut bytes_copied = 0u64;
    let mut cancelled = false;

    for (relative_path, entry) in &manifest {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let _ = progress.send(ProgressEvent::FileStarted {
            relative_path: relative_path.clone(),
        });

        let mut resolved = false;
        for candidate in &chain {
            let Some(folder) = &candidate.backup_folder else {
                continue;
            };
            let candidate_path = root_backup_dir.join(folder).join(relative_path);
            if candidate_path.is_file() {
                let dest_path = destination.join(relative_path);
                if let Some(parent) = dest_path.parent() {
                    std::fs::create_dir_all(parent).ok();
                }
                if std::fs::copy(&candidate_path, &dest_path).is_ok() {
                    crate::core::fs_util::preserve_metadata(&candidate_path, &dest_path);
                    files_restored += 1;
                    bytes_copied += entry.file_size.max(0) as u64;
                    resolved = true;
                }
                break;
            }
        }

        if !resolved {
            warn!(path = %relative_path, "unresolved entry: not found anywhere in the chain");
            unresolved_paths.push(relative_path.clone());
        }

        files_processed += 1;
        if files_processed % 100 == 0 {
            let _ = progress.send(ProgressEvent::Counts {
                files_total,
                files_processed,
                files_copied: files_restored,
                files_skipped: unresolved_paths.len() as u64,
                bytes_copied,
            });
        }
    }

    let _ = progress.send(ProgressEvent::Done {
        success: !cancelled,
        error: None,
    });
    info!(
        session_id = session.id,
        files_restored,
        unresolved = unresolved_paths.len(),
        "restore finished"
    );

    Ok(RestoreOutcome {
        files_restored,
        files_unresolved: unresolved_paths.len() as u64,
        unresolved_paths,
        cancelled,
        legacy: false,
    })
}

/// Copy a backup folder's contents verbatim into `destination`. Used when
/// the catalog has no record of this folder (catalog loss, or a folder
/// moved outside the destination root it was created under).
fn legacy_restore(
    backup_folder_path: &Path,
    destination: &Path,
    progress: &Sender<ProgressEvent>,
    cancel: &CancellationToken,
) -> Result<RestoreOutcome, RestoreError> {
    let entries: Vec<PathBuf> = walkdir::WalkDir::new(backup_folder_path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    let files_total = entries.len() as u64;
    let mut files_restored = 0u64;
    let mut cancelled = false;

    for source_file in &entries {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let relative_path = match source_file.strip_prefix(backup_folder_path) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        let _ = progress.send(ProgressEvent::FileStarted {
            relative_path: relative_path.clone(),
        });

        let dest_path = destination.join(&relative_path);
        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if std::fs::copy(source_file, &dest_path).is_ok() {
            crate::core::fs_util::preserve_metadata(source_file, &dest_path);
            files_restored += 1;
        }
    }

    let _ = progress.send(ProgressEvent::Counts {
        files_total,
        files_processed: files_restored,
        files_copied: files_restored,
        files_skipped: 0,
        bytes_copied: 0,
    });
    let _ = progress.send(ProgressEvent::Done {
        success: !cancelled,
        error: None,
    });

    Ok(RestoreOutcome {
        files_restored,
        files_unresolved: 0,
        unresolved_paths: Vec::new(),
        cancelled,
        legacy: true,
    })
}
