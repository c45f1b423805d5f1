//! Error types for segment decryption.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for decryption operations.
pub type DecryptResult<T> = Result<T, DecryptError>;

/// Errors that can occur while decrypting a segment.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// The packet stream could not be parsed.
    #[error("malformed encrypted segment: {0}")]
    Malformed(String),

    /// The segment uses an algorithm or packet outside the supported profile.
    #[error("unsupported {what} {value}, only AES-256 with SHA-256 string-to-key and no compression is supported")]
    Unsupported { what: &'static str, value: u8 },

    /// A required packet was absent.
    #[error("no {0} packet found in segment")]
    MissingPacket(&'static str),

    /// The passphrase was requested a second time for one message.
    #[error("passphrase requested more than once, the passphrase is wrong or the segment is corrupt")]
    PassphraseAlreadyUsed,

    /// The repeated prefix bytes did not match after decryption.
    #[error("quick check failed after decryption, the passphrase is wrong or the segment is corrupt")]
    QuickCheckFailed,

    /// The modification detection code did not match.
    #[error("modification detection code mismatch, the segment is corrupt")]
    IntegrityCheckFailed,

    /// The cipher could not be initialised with the derived key.
    #[error("cipher initialisation failed: {0}")]
    Cipher(String),

    /// The input path does not carry the encrypted marker suffix.
    #[error("'{path}' does not end in .encrypted")]
    MissingSuffix { path: PathBuf },

    /// Reading the segment or writing the plaintext failed.
    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn malformed(reason: impl Into<String>) -> DecryptError {
    DecryptError::Malformed(reason.into())
}
