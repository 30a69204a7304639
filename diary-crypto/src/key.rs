//! Password-based key derivation.
//!
//! One canonical scheme is used on every surface: PBKDF2-HMAC-SHA256 over the
//! UTF-8 password bytes and the *decoded* salt bytes, producing a 256-bit key
//! that feeds AES-256-GCM directly.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a derived vault key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of a freshly generated salt in bytes (256 bits).
pub const SALT_SIZE: usize = 32;

/// Shortest salt accepted when decoding a stored value.
pub const MIN_SALT_SIZE: usize = 16;

/// Work factor floor. Derivation below this is refused.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Work factor used for newly created vaults.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Tunable KDF parameters.
///
/// The iteration count is persisted with each vault, so raising the default
/// only affects vaults created afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    /// Rejects parameters below the work factor floor.
    pub fn validate(&self) -> CryptoResult<()> {
        if self.iterations < MIN_PBKDF2_ITERATIONS {
            return Err(CryptoError::Derivation(format!(
                "iteration count {} is below minimum {MIN_PBKDF2_ITERATIONS}",
                self.iterations
            )));
        }
        Ok(())
    }
}

/// Per-vault random salt. Stored as lowercase hex.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Draws a new 256-bit salt from the OS-seeded CSPRNG.
    pub fn random() -> Self {
        let mut bytes = vec![0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps raw salt bytes, enforcing the minimum length.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.is_empty() {
            return Err(CryptoError::Derivation("salt is empty".to_string()));
        }
        if bytes.len() < MIN_SALT_SIZE {
            return Err(CryptoError::Derivation(format!(
                "salt is {} bytes, minimum is {MIN_SALT_SIZE}",
                bytes.len()
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Decodes the persisted hex form.
    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(CryptoError::Derivation("salt is empty".to_string()));
        }
        let bytes = hex::decode(encoded)
            .map_err(|e| CryptoError::Derivation(format!("salt is not valid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Salt").field(&self.to_hex()).finish()
    }
}

impl From<Salt> for String {
    fn from(salt: Salt) -> Self {
        salt.to_hex()
    }
}

impl TryFrom<String> for Salt {
    type Error = CryptoError;

    fn try_from(value: String) -> CryptoResult<Self> {
        Self::from_hex(&value)
    }
}

/// Generates a fresh vault salt.
pub fn generate_salt() -> Salt {
    Salt::random()
}

/// A 256-bit symmetric key derived from a vault password.
///
/// Wiped from memory when dropped. Never serialized and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_SIZE]);

impl VaultKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([redacted])")
    }
}

/// Generates a random key, bypassing derivation. Used for keys that are
/// never reproduced from a password.
pub fn generate_random_key() -> VaultKey {
    let mut bytes = [0u8; KEY_SIZE];
    rand::rng().fill_bytes(&mut bytes);
    let key = VaultKey::from_bytes(bytes);
    bytes.zeroize();
    key
}

/// Derives the vault key for `(password, salt)`.
///
/// Deterministic: the same inputs always give the same key. This is a
/// deliberately slow call; derive once per logical vault operation.
pub fn derive_key(password: &str, salt: &Salt, params: &KdfParams) -> CryptoResult<VaultKey> {
    if password.is_empty() {
        return Err(CryptoError::Derivation("password is empty".to_string()));
    }
    params.validate()?;

    let mut output = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        params.iterations,
        &mut output,
    );
    let key = VaultKey::from_bytes(output);
    output.zeroize();
    Ok(key)
}

/// Same as [`derive_key`], taking the salt in its persisted hex form.
pub fn derive_key_hex(password: &str, salt_hex: &str, params: &KdfParams) -> CryptoResult<VaultKey> {
    let salt = Salt::from_hex(salt_hex)?;
    derive_key(password, &salt, params)
}
