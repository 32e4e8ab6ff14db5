//! Decides whether a source file needs to be copied into the current
//! backup, given the effective mode and (if any) the reference session's
//! manifest, via a size-then-mtime-then-hash escalation.

use std::collections::HashMap;
use std::path::Path;

use crate::core::hasher::{hash_file, HashError};
use crate::core::model::{BackupMode, ManifestEntry};

/// Outcome of comparing one source file against its reference entry.
pub struct Decision {
    pub should_copy: bool,
    /// The file's current content hash, known whenever we had to read it
    /// (always for Full, or whenever the quick check could not rule out
    /// a change) — reused so the caller never hashes a file twice.
    pub current_hash: Option<String>,
}

/// Decide whether `source_file` (at `relative_path` within the source
/// tree) needs to be copied under `mode`, given the reference session's
/// manifest (`None` when there is no usable reference — i.e. this is
/// effectively a full backup).
pub fn decide(
    source_file: &Path,
    relative_path: &str,
    mode: BackupMode,
    reference_files: Option<&HashMap<String, ManifestEntry>>,
) -> Result<Decision, HashError> {
    // Full backups always copy, but we still need the hash for the manifest.
    if mode == BackupMode::Full {
        let hash = hash_file(source_file)?.to_string();
        return Ok(Decision {
            should_copy: true,
            current_hash: Some(hash),
        });
    }

    let reference_files = match reference_files {
        Some(files) if !files.is_empty() => files,
        _ => {
            let hash = hash_file(source_file)?.to_string();
            return Ok(Decision {
                should_copy: true,
                current_hash: Some(hash),
            });
        }
    };

    let reference = match reference_files.get(relative_path) {
        Some(entry) => entry,
        None => {
            // New file relative to the reference — always copy.
            let hash = hash_file(source_file)?.to_string();
            return Ok(Decision {
                should_copy: true,
                current_hash: Some(hash),
            });
        }
    };

    // Quick check: size first (cheapest), then mtime within 1s tolerance.
    let meta = match std::fs::symlink_metadata(source_file) {
        Ok(meta) => meta,
        Err(_) => {
            // Metadata unreadable — fall back to the confirming hash.
            return confirm_via_hash(source_file, reference);
        }
    };

    if meta.len() as i64 != reference.file_size {
        let hash = hash_file(source_file)?.to_string();
        return Ok(Decision {
            should_copy: true,
            current_hash: Some(hash),
        });
    }

    if let Ok(modified) = meta.modified() {
        let reference_time: std::time::SystemTime = reference.modified_at.into();
        let diff = match modified.duration_since(reference_time) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        if diff.as_secs_f64() < 1.0 {
            // Size and mtime both match: assume unchanged, reuse the
            // reference hash rather than re-reading the file.
            return Ok(Decision {
                should_copy: false,
                current_hash: Some(reference.file_hash.clone()),
            });
        }
    }

    confirm_via_hash(source_file, reference)
}

fn confirm_via_hash(source_file: &Path, reference: &ManifestEntry) -> Result<Decision, HashError> {
    let current_hash = hash_file(source_file)?.to_string();
    let should_copy = current_hash != reference.file_hash;
    Ok(Decision {
        should_copy,
        current_hash: Some(current_hash),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reference_for(path: &Path, relative_path: &str) -> HashMap<String, ManifestEntry> {
        let hash = hash_file(path).unwrap().to_string();
        let meta = std::fs::metadata(path).unwrap();
        let mut map = HashMap::new();
        map.insert(
            relative_path.to_string(),
            ManifestEntry {
                relative_path: relative_path.to_string(),
                file_hash: hash,
                file_size: meta.len() as i64,
                modified_at: meta.modified().unwrap().into(),
            },
        );
        map
    }

    #[test]
    fn full_mode_always_copies() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"data").unwrap();
        let decision = decide(f.path(), "a.txt", BackupMode::Full, None).unwrap();
        assert!(decision.should_copy);
    }

    #[test]
    fn incremental_skips_unchanged_file() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"data").unwrap();
        let reference = reference_for(f.path(), "a.txt");

        let decision = decide(f.path(), "a.txt", BackupMode::Incremental, Some(&reference)).unwrap();
        assert!(!decision.should_copy);
    }

    #[test]
    fn incremental_copies_file_missing_from_reference() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"data").unwrap();
        let reference = reference_for(f.path(), "other.txt");

        let decision = decide(f.path(), "a.txt", BackupMode::Incremental, Some(&reference)).unwrap();
        assert!(decision.should_copy);
    }

    #[test]
    fn incremental_copies_when_size_differs_from_reference() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"data").unwrap();
        let mut reference = reference_for(f.path(), "a.txt");
        reference.get_mut("a.txt").unwrap().file_size = 999;

        let decision = decide(f.path(), "a.txt", BackupMode::Incremental, Some(&reference)).unwrap();
        assert!(decision.should_copy);
    }

    #[test]
    fn differential_with_no_reference_behaves_as_full() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"data").unwrap();
        let decision = decide(f.path(), "a.txt", BackupMode::Differential, None).unwrap();
        assert!(decision.should_copy);
        let _ = Local::now();
    }
}
