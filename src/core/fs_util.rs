//! Small filesystem helpers shared by the executor and restore resolver.

use std::path::Path;

/// Best-effort copy of permissions and modification time from `source` to
/// `dest` after a byte copy. Never fails the caller — a backup or restore
/// with slightly off metadata is still strictly better than aborting.
#[cfg(unix)]
pub fn preserve_metadata(source: &Path, dest: &Path) {
    if let Ok(meta) = std::fs::metadata(source) {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(dest, std::fs::Permissions::from_mode(meta.permissions().mode()));
        if let Ok(modified) = meta.modified() {
            let mtime = filetime::FileTime::from_system_time(modified);
            let _ = filetime::set_file_mtime(dest, mtime);
        }
    }
}

#[cfg(not(unix))]
pub fn preserve_metadata(source: &Path, dest: &Path) {
    if let Ok(meta) = std::fs::metadata(source) {
        if let Ok(modified) = meta.modified() {
            let mtime = filetime::FileTime::from_system_time(modified);
            let _ = filetime::set_file_mtime(dest, mtime);
        }
    }
}
