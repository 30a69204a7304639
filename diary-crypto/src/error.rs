//! Error types for the vault encryption core.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors produced by the encryption core.
///
/// None of the variants carry plaintext, passwords or key bytes.
#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    /// The candidate vault password failed the strength check.
    #[error("password too weak (score {score})")]
    InvalidPassword { score: u8, feedback: Vec<String> },

    /// Key derivation input was malformed (empty salt, bad hex, low work factor).
    #[error("key derivation failed: {0}")]
    Derivation(String),

    /// The AEAD refused to seal. Not expected in normal operation.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Authentication failed or the envelope is structurally invalid.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The envelope names an algorithm this build does not implement.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A custom redaction pattern failed to compile.
    #[error("invalid redaction pattern: {0}")]
    InvalidPattern(String),
}
