//! Archive post-processing, kept as an external collaborator the backup
//! core has no knowledge of — only the scheduler's post-fire step and the
//! CLI's `archive`/`unarchive` subcommands depend on this module.
//!
//! ZIP (deflate, level 6) for compression; PBKDF2-HMAC-SHA256 (480,000
//! iterations, 16-byte random salt, 32-byte key) feeding an AEAD cipher
//! for password encryption, with the on-disk framing `salt || nonce ||
//! ciphertext`.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const PBKDF2_ITERATIONS: u32 = 480_000;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum PostProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("encrypted archive is truncated or corrupt")]
    Truncated,
    #[error("decryption failed (wrong password or corrupt archive)")]
    DecryptionFailed,
}

type Result<T> = std::result::Result<T, PostProcessError>;

/// Behavior the executor/scheduler depend on without knowing the concrete
/// algorithm: a backup folder's on-disk representation (plain, zipped,
/// zipped-and-encrypted) is this trait's concern alone.
pub trait ArchivePostProcessor {
    fn compress(&self, folder: &Path) -> Result<PathBuf>;
    fn decompress(&self, archive: &Path, destination: &Path) -> Result<()>;
    fn encrypt(&self, archive: &Path, password: &str) -> Result<PathBuf>;
    fn decrypt(&self, encrypted: &Path, password: &str) -> Result<PathBuf>;
}

/// The concrete implementation: ZIP deflate for compression, AES-256-GCM
/// keyed by PBKDF2-HMAC-SHA256 for password encryption.
pub struct ZipAesPostProcessor;

impl ArchivePostProcessor for ZipAesPostProcessor {
    /// Zip `folder`'s contents (recursively) into `<folder>.zip`.
    fn compress(&self, folder: &Path) -> Result<PathBuf> {
        let zip_path = folder.with_extension("zip");
        let file = File::create(&zip_path)?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(6));

        for entry in walkdir::WalkDir::new(folder).into_iter().filter_map(std::result::Result::ok) {
            let path = entry.path();
            let name = path.strip_prefix(folder).unwrap_or(path);
            if name.as_os_str().is_empty() {
                continue;
            }
            let name_str = name.to_string_lossy().replace('\\', "/");

            if entry.file_type().is_dir() {
                writer.add_directory(format!("{name_str}/"), options)?;
            } else if entry.file_type().is_file() {
                writer.start_file(name_str, options)?;
                let mut buf = Vec::new();
                File::open(path)?.read_to_end(&mut buf)?;
                writer.write_all(&buf)?;
            }
        }
        writer.finish()?;
        Ok(zip_path)
    }

    /// Unzip `archive` into `destination`, recreating its directory tree.
    fn decompress(&self, archive: &Path, destination: &Path) -> Result<()> {
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file)?;
        std::fs::create_dir_all(destination)?;

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let out_path = match entry.enclosed_name() {
                Some(name) => destination.join(name),
                None => continue,
            };
            if entry.is_dir() {
                std::fs::create_dir_all(&out_path)?;
            } else {
                if let Some(parent) = out_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut out_file = File::create(&out_path)?;
                std::io::copy(&mut entry, &mut out_file)?;
            }
        }
        Ok(())
    }

    /// Derive a 32-byte key from `password` via PBKDF2-HMAC-SHA256 with a
    /// fresh random salt, AES-256-GCM encrypt `archive`, and write
    /// `<archive>.enc` framed as `salt || nonce || ciphertext`.
    fn encrypt(&self, archive: &Path, password: &str) -> Result<PathBuf> {
        let mut plaintext = Vec::new();
        File::open(archive)?.read_to_end(&mut plaintext)?;

        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);

        let mut key_bytes = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut key_bytes);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        let cipher = Aes256Gcm::new(key);

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| PostProcessError::DecryptionFailed)?;

        let mut out = Vec::with_capacity(SALT_LEN + nonce.len() + ciphertext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);

        let enc_path = PathBuf::from(format!("{}.enc", archive.display()));
        File::create(&enc_path)?.write_all(&out)?;
        Ok(enc_path)
    }

    /// Reverse `encrypt`: read `salt || nonce || ciphertext`, rederive the
    /// key, and write the decrypted zip bytes to a sibling path with the
    /// `.enc` suffix stripped.
    fn decrypt(&self, encrypted: &Path, password: &str) -> Result<PathBuf> {
        let mut data = Vec::new();
        File::open(encrypted)?.read_to_end(&mut data)?;

        let nonce_len = 12; // Aes256Gcm's standard nonce size
        if data.len() < SALT_LEN + nonce_len {
            return Err(PostProcessError::Truncated);
        }
        let (salt, rest) = data.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(nonce_len);

        let mut key_bytes = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key_bytes);
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        let cipher = Aes256Gcm::new(key);
        let nonce = aes_gcm::Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| PostProcessError::DecryptionFailed)?;

        let out_path = encrypted.with_extension("");
        File::create(&out_path)?.write_all(&plaintext)?;
        Ok(out_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn compress_then_decompress_round_trips() {
        let folder = tempdir().unwrap();
        std::fs::write(folder.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(folder.path().join("sub")).unwrap();
        std::fs::write(folder.path().join("sub/b.txt"), b"world").unwrap();

        let processor = ZipAesPostProcessor;
        let zip_path = processor.compress(folder.path()).unwrap();
        assert!(zip_path.exists());

        let restored = tempdir().unwrap();
        processor.decompress(&zip_path, restored.path()).unwrap();

        assert_eq!(std::fs::read(restored.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(restored.path().join("sub/b.txt")).unwrap(), b"world");
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let folder = tempdir().unwrap();
        std::fs::write(folder.path().join("a.txt"), b"secret payload").unwrap();

        let processor = ZipAesPostProcessor;
        let zip_path = processor.compress(folder.path()).unwrap();
        let enc_path = processor.encrypt(&zip_path, "correct horse battery staple").unwrap();
        assert!(enc_path.exists());
        assert_ne!(std::fs::read(&enc_path).unwrap(), std::fs::read(&zip_path).unwrap());

        let decrypted_zip = processor.decrypt(&enc_path, "correct horse battery staple").unwrap();
        assert_eq!(std::fs::read(&decrypted_zip).unwrap(), std::fs::read(&zip_path).unwrap());
    }

    #[test]
    fn decrypt_with_wrong_password_fails() {
        let folder = tempdir().unwrap();
        std::fs::write(folder.path().join("a.txt"), b"secret payload").unwrap();

        let processor = ZipAesPostProcessor;
        let zip_path = processor.compress(folder.path()).unwrap();
        let enc_path = processor.encrypt(&zip_path, "right-password").unwrap();

        let result = processor.decrypt(&enc_path, "wrong-password");
        assert!(result.is_err());
    }
}
