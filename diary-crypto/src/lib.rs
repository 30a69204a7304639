//! Private vault encryption core for Diary+.
//!
//! Provides the stateless primitives behind vault-protected journal content:
//! - PBKDF2-HMAC-SHA256 key derivation from a password and per-vault salt
//! - AES-256-GCM authenticated encryption into self-describing envelopes
//! - Keyed, truncated search tokens for equality lookup without plaintext
//! - Password strength scoring for vault setup
//! - Best-effort PII redaction and location blurring for exports
//!
//! # Architecture
//!
//! Every operation is a pure function of its explicit inputs. Nothing here
//! caches a key or logs content, so calls are safe from any thread without
//! coordination.
//!
//! 1. **Key**: derived from the password on each vault access and wiped on
//!    drop. The server never stores it.
//!
//! 2. **Envelope**: ciphertext, IV, tag and algorithm id stored together.
//!    A new envelope (with a new IV) is produced on every write.

mod cipher;
mod error;
mod key;
pub mod redact;
pub mod search;
pub mod strength;

pub use cipher::{
    decrypt, decrypt_bound, encrypt, encrypt_bound, Algorithm, EncryptedEnvelope,
    ASSOCIATED_DATA, NONCE_SIZE, TAG_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    derive_key, derive_key_hex, generate_random_key, generate_salt, KdfParams, Salt, VaultKey,
    DEFAULT_PBKDF2_ITERATIONS, KEY_SIZE, MIN_PBKDF2_ITERATIONS, MIN_SALT_SIZE, SALT_SIZE,
};
pub use redact::{anonymize_location, redact_pii, Coordinates, RedactionRule, Redactor};
pub use search::{hash_for_search, keyword_tokens};
pub use strength::{
    require_strength, validate_key_strength, validate_key_strength_with, PasswordStrengthResult,
    MAX_SCORE, MIN_VALID_SCORE,
};
