//! Content hashing and the cheap metadata fingerprint used to shortcut it.
//!
//! SHA-256 over 64 KiB chunks for the confirming hash; plain size/mtime
//! comparison (no hashing needed) for the quick check.

use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 65536;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A SHA-256 content digest, rendered as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDigest([u8; 32]);

impl fmt::Display for FileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for FileDigest {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; 32];
        if bytes.len() == 32 {
            arr.copy_from_slice(&bytes);
        }
        Ok(FileDigest(arr))
    }
}

/// Stream a file's SHA-256 digest in bounded-memory chunks.
pub fn hash_file(path: &Path) -> Result<FileDigest, HashError> {
    let mut file = File::open(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&digest);
    Ok(FileDigest(arr))
}

/// A cheap, never-persisted (size, mtime) pair used to shortcut a full
/// hash comparison. Not a hash at all — the struct comparison already
/// carries as much information as the original's `md5(size:mtime_ns)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuickFingerprint {
    pub size: u64,
    pub mtime: std::time::SystemTime,
}

impl QuickFingerprint {
    pub fn of(path: &Path) -> Result<Self, HashError> {
        let meta = std::fs::symlink_metadata(path).map_err(|source| HashError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(QuickFingerprint {
            size: meta.len(),
            mtime: meta
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        })
    }

    /// True when the gap between this fingerprint's mtime and `other` is
    /// below the one-second filesystem-resolution tolerance.
    pub fn mtime_within_tolerance(&self, other: std::time::SystemTime) -> bool {
        let diff = match self.mtime.duration_since(other) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        diff.as_secs_f64() < 1.0
    }
}
