//! Vault error types.

use diary_crypto::CryptoError;
use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault not initialized")]
    NotInitialized,

    #[error("vault already initialized")]
    AlreadyInitialized,

    /// The candidate password scored below the configured threshold.
    #[error("password too weak")]
    WeakPassword(Vec<String>),

    /// The password did not open the verification token. Carries no detail
    /// so callers cannot tell a wrong password from a damaged token.
    #[error("invalid password")]
    InvalidPassword,

    /// The vault was re-keyed after this session was opened.
    #[error("vault session expired")]
    SessionExpired,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("vault not found: {0}")]
    VaultNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<duckdb::Error> for VaultError {
    fn from(e: duckdb::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Storage(e.to_string())
    }
}

impl VaultError {
    /// Feedback strings for a rejected password, empty for other errors.
    pub fn feedback(&self) -> &[String] {
        match self {
            VaultError::WeakPassword(feedback) => feedback,
            _ => &[],
        }
    }
}
