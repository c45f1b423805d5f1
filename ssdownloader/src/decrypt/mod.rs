//! Segment decryption.
//!
//! Each downloaded segment `<file>.<part>.encrypted` is decrypted with the
//! passphrase `server_secret || key_code` into `<file>.<part>`. On success
//! the encrypted file is removed; on failure it is left in place for
//! diagnosis.
//!
//! Only the single symmetric profile the service emits is understood (see
//! [`message`] for the exact packet layout). Anything else, including a
//! second request for the passphrase, is a hard error: a failure here
//! almost always means the key code or the data is wrong, and guessing
//! again cannot help.

mod error;
pub mod message;
mod packet;
mod s2k;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::clock::{Clock, SystemClock};

pub use error::{DecryptError, DecryptResult};
pub use message::{decrypt_message, encrypt_message, LiteralData};
pub use s2k::PROFILE_S2K_COUNT;

/// Suffix marking a segment that has been downloaded but not decrypted.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// A passphrase that can be handed out exactly once.
pub struct OneShotPassphrase {
    passphrase: String,
    requested: AtomicBool,
}

impl OneShotPassphrase {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: passphrase.into(),
            requested: AtomicBool::new(false),
        }
    }

    /// Build the package passphrase from its two halves.
    pub fn for_package(server_secret: &str, key_code: &str) -> Self {
        Self::new(format!("{}{}", server_secret, key_code))
    }

    /// Return the passphrase on the first call and fail on every later one.
    pub fn take(&self) -> DecryptResult<&str> {
        if self.requested.swap(true, Ordering::SeqCst) {
            return Err(DecryptError::PassphraseAlreadyUsed);
        }
        Ok(&self.passphrase)
    }
}

impl std::fmt::Debug for OneShotPassphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShotPassphrase")
            .field("requested", &self.requested.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Path a segment decrypts to: the input with `.encrypted` removed.
pub fn decrypted_path(encrypted: &Path) -> DecryptResult<PathBuf> {
    encrypted
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_suffix(ENCRYPTED_SUFFIX))
        .filter(|name| !name.is_empty())
        .map(|name| encrypted.with_file_name(name))
        .ok_or_else(|| DecryptError::MissingSuffix {
            path: encrypted.to_path_buf(),
        })
}

/// Decrypts downloaded segments in place.
#[derive(Clone)]
pub struct PartDecryptor {
    clock: Arc<dyn Clock>,
}

impl Default for PartDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl PartDecryptor {
    /// Create a decryptor using the wall clock.
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a different clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Decrypt one segment, returning the path of the plaintext file.
    pub fn decrypt_part(
        &self,
        encrypted: &Path,
        server_secret: &str,
        key_code: &str,
    ) -> DecryptResult<PathBuf> {
        let output = decrypted_path(encrypted)?;
        let message = fs::read(encrypted).map_err(|e| DecryptError::Io {
            path: encrypted.to_path_buf(),
            source: e,
        })?;

        let passphrase = OneShotPassphrase::for_package(server_secret, key_code);
        let literal = decrypt_message(&message, &passphrase)?;
        debug!(
            path = %encrypted.display(),
            bytes = literal.data.len(),
            encrypted_age_secs = (self.clock.now() - literal.created).num_seconds(),
            "segment decrypted"
        );

        fs::write(&output, &literal.data).map_err(|e| DecryptError::Io {
            path: output.clone(),
            source: e,
        })?;
        fs::remove_file(encrypted).map_err(|e| DecryptError::Io {
            path: encrypted.to_path_buf(),
            source: e,
        })?;
        Ok(output)
    }
}

/// Decrypt one segment with the wall clock.
pub fn decrypt_part(encrypted: &Path, server_secret: &str, key_code: &str) -> DecryptResult<PathBuf> {
    PartDecryptor::new().decrypt_part(encrypted, server_secret, key_code)
}

/// Produces segments in the same profile the service uses.
///
/// Used by test doubles that need to serve decryptable payloads.
#[derive(Clone)]
pub struct PartEncryptor {
    clock: Arc<dyn Clock>,
}

impl Default for PartEncryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl PartEncryptor {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp literal packets with times from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Encrypt `data` for the package passphrase `server_secret || key_code`.
    pub fn encrypt_part(
        &self,
        data: &[u8],
        server_secret: &str,
        key_code: &str,
        file_name: &str,
    ) -> DecryptResult<Vec<u8>> {
        encrypt_message(
            data,
            &format!("{}{}", server_secret, key_code),
            file_name,
            self.clock.now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use tempfile::TempDir;

    fn encryptor() -> PartEncryptor {
        PartEncryptor::with_clock(Arc::new(FixedClock::from_timestamp(1_650_000_000)))
    }

    #[test]
    fn test_decrypted_path() {
        assert_eq!(
            decrypted_path(Path::new("/tmp/out/report.log.3.encrypted")).unwrap(),
            PathBuf::from("/tmp/out/report.log.3")
        );
        assert!(decrypted_path(Path::new("/tmp/out/report.log.3")).is_err());
        assert!(decrypted_path(Path::new("/tmp/out/.encrypted")).is_err());
    }

    #[test]
    fn test_one_shot_passphrase() {
        let passphrase = OneShotPassphrase::for_package("secret", "code");
        assert_eq!(passphrase.take().unwrap(), "secretcode");
        assert!(matches!(
            passphrase.take(),
            Err(DecryptError::PassphraseAlreadyUsed)
        ));
        assert!(!format!("{passphrase:?}").contains("secretcode"));
    }

    #[test]
    fn test_decrypt_part_replaces_encrypted_file() {
        let dir = TempDir::new().unwrap();
        let encrypted = dir.path().join("data.bin.1.encrypted");
        let payload = encryptor()
            .encrypt_part(b"segment one", "server", "key", "data.bin.1")
            .unwrap();
        fs::write(&encrypted, payload).unwrap();

        let decryptor = PartDecryptor::with_clock(Arc::new(FixedClock::from_timestamp(1_650_000_060)));
        let output = decryptor.decrypt_part(&encrypted, "server", "key").unwrap();

        assert_eq!(output, dir.path().join("data.bin.1"));
        assert_eq!(fs::read(&output).unwrap(), b"segment one");
        assert!(!encrypted.exists());
    }

    #[test]
    fn test_decrypt_part_failure_keeps_encrypted_file() {
        let dir = TempDir::new().unwrap();
        let encrypted = dir.path().join("data.bin.1.encrypted");
        let payload = encryptor()
            .encrypt_part(b"segment one", "server", "key", "data.bin.1")
            .unwrap();
        fs::write(&encrypted, payload).unwrap();

        let err = decrypt_part(&encrypted, "server", "wrong-key").unwrap_err();

        assert!(matches!(
            err,
            DecryptError::QuickCheckFailed | DecryptError::IntegrityCheckFailed
        ));
        assert!(encrypted.exists());
        assert!(!dir.path().join("data.bin.1").exists());
    }

    #[test]
    fn test_decrypt_part_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = decrypt_part(&dir.path().join("gone.1.encrypted"), "s", "k").unwrap_err();
        assert!(matches!(err, DecryptError::Io { .. }));
    }
}
