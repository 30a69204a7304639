//! Authenticated encryption of vault content.
//!
//! AES-256-GCM with a fresh random 96-bit IV per call and a fixed
//! application associated-data tag. Output is an [`EncryptedEnvelope`] whose
//! binary fields are base64 text, matching the vault's TEXT columns.

use crate::error::{CryptoError, CryptoResult};
use crate::key::VaultKey;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// IV length for AES-GCM.
pub const NONCE_SIZE: usize = 12;

/// Authentication tag length for AES-GCM.
pub const TAG_SIZE: usize = 16;

/// Associated data bound into every vault ciphertext.
pub const ASSOCIATED_DATA: &[u8] = b"diary-plus/vault-entry/v1";

/// Algorithms this build can open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Aes256Gcm,
}

impl Algorithm {
    /// The algorithm every new envelope is sealed with.
    pub const CURRENT: Algorithm = Algorithm::Aes256Gcm;

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Aes256Gcm => "aes-256-gcm",
        }
    }

    /// Resolves an envelope's algorithm id. Unknown ids are refused rather
    /// than mapped to a fallback.
    pub fn parse(id: &str) -> CryptoResult<Self> {
        match id {
            "aes-256-gcm" => Ok(Algorithm::Aes256Gcm),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stored form of one encrypted field.
///
/// Serialized names match the vault content columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "encrypted_content")]
    pub ciphertext: String,
    pub iv: String,
    pub auth_tag: String,
    pub algorithm: String,
}

/// Decoded binary parts of a validated envelope.
struct EnvelopeParts {
    algorithm: Algorithm,
    ciphertext: Vec<u8>,
    iv: [u8; NONCE_SIZE],
    tag: [u8; TAG_SIZE],
}

impl EncryptedEnvelope {
    /// Rebuilds an envelope from nullable database columns.
    ///
    /// All four columns are required together; any missing one is a
    /// structural decryption failure.
    pub fn from_columns(
        encrypted_content: Option<String>,
        iv: Option<String>,
        auth_tag: Option<String>,
        algorithm: Option<String>,
    ) -> CryptoResult<Self> {
        let missing = |column: &str| {
            CryptoError::Decryption(format!("malformed envelope: missing {column}"))
        };
        Ok(Self {
            ciphertext: encrypted_content.ok_or_else(|| missing("encrypted_content"))?,
            iv: iv.ok_or_else(|| missing("iv"))?,
            auth_tag: auth_tag.ok_or_else(|| missing("auth_tag"))?,
            algorithm: algorithm.ok_or_else(|| missing("algorithm"))?,
        })
    }

    /// The algorithm this envelope claims, if this build supports it.
    pub fn algorithm(&self) -> CryptoResult<Algorithm> {
        if self.algorithm.is_empty() {
            return Err(CryptoError::Decryption(
                "malformed envelope: missing algorithm".to_string(),
            ));
        }
        Algorithm::parse(&self.algorithm)
    }

    /// Checks algorithm and field shapes without touching a key.
    pub fn validate(&self) -> CryptoResult<()> {
        self.decode().map(|_| ())
    }

    fn decode(&self) -> CryptoResult<EnvelopeParts> {
        let algorithm = self.algorithm()?;
        let ciphertext = decode_field("encrypted_content", &self.ciphertext)?;
        let iv = decode_fixed::<NONCE_SIZE>("iv", &self.iv)?;
        let tag = decode_fixed::<TAG_SIZE>("auth_tag", &self.auth_tag)?;
        Ok(EnvelopeParts {
            algorithm,
            ciphertext,
            iv,
            tag,
        })
    }

    /// Packs the envelope as `iv || ciphertext || tag`, the layout WebCrypto's
    /// AES-GCM produces when the IV is prepended.
    pub fn to_sealed_bytes(&self) -> CryptoResult<Vec<u8>> {
        let parts = self.decode()?;
        let mut out = Vec::with_capacity(NONCE_SIZE + parts.ciphertext.len() + TAG_SIZE);
        out.extend_from_slice(&parts.iv);
        out.extend_from_slice(&parts.ciphertext);
        out.extend_from_slice(&parts.tag);
        Ok(out)
    }

    /// Splits `iv || ciphertext || tag` back into an envelope.
    pub fn from_sealed_bytes(algorithm: &str, sealed: &[u8]) -> CryptoResult<Self> {
        let algorithm = Algorithm::parse(algorithm)?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "malformed envelope: sealed payload is {} bytes, minimum is {}",
                sealed.len(),
                NONCE_SIZE + TAG_SIZE
            )));
        }
        let (iv, rest) = sealed.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);
        Ok(Self {
            ciphertext: BASE64.encode(ciphertext),
            iv: BASE64.encode(iv),
            auth_tag: BASE64.encode(tag),
            algorithm: algorithm.as_str().to_string(),
        })
    }
}

fn decode_field(name: &str, value: &str) -> CryptoResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| CryptoError::Decryption(format!("malformed envelope: {name} is not base64: {e}")))
}

fn decode_fixed<const N: usize>(name: &str, value: &str) -> CryptoResult<[u8; N]> {
    let bytes = decode_field(name, value)?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::Decryption(format!(
            "malformed envelope: {name} is {} bytes, expected {N}",
            bytes.len()
        ))
    })
}

fn associated_data(binding: Option<&str>) -> Vec<u8> {
    let mut aad = ASSOCIATED_DATA.to_vec();
    if let Some(binding) = binding {
        aad.push(0);
        aad.extend_from_slice(binding.as_bytes());
    }
    aad
}

/// Encrypts `plaintext` under `key` with a fresh random IV.
pub fn encrypt(plaintext: &str, key: &VaultKey) -> CryptoResult<EncryptedEnvelope> {
    seal(plaintext.as_bytes(), key, &associated_data(None))
}

/// Like [`encrypt`], additionally binding the ciphertext to `binding`
/// (typically the entry id). The same binding must be supplied to decrypt.
pub fn encrypt_bound(
    plaintext: &str,
    key: &VaultKey,
    binding: &str,
) -> CryptoResult<EncryptedEnvelope> {
    seal(plaintext.as_bytes(), key, &associated_data(Some(binding)))
}

/// Opens an envelope produced by [`encrypt`].
///
/// Fails with [`CryptoError::Decryption`] on a wrong key, any tampering or a
/// malformed envelope, and with [`CryptoError::UnsupportedAlgorithm`] when the
/// envelope names an algorithm this build does not implement.
pub fn decrypt(envelope: &EncryptedEnvelope, key: &VaultKey) -> CryptoResult<String> {
    open(envelope, key, &associated_data(None))
}

/// Opens an envelope produced by [`encrypt_bound`] with the same binding.
pub fn decrypt_bound(
    envelope: &EncryptedEnvelope,
    key: &VaultKey,
    binding: &str,
) -> CryptoResult<String> {
    open(envelope, key, &associated_data(Some(binding)))
}

fn seal(plaintext: &[u8], key: &VaultKey, aad: &[u8]) -> CryptoResult<EncryptedEnvelope> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut iv = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let mut buffer = plaintext.to_vec();
    let tag = match cipher.encrypt_in_place_detached(Nonce::from_slice(&iv), aad, &mut buffer) {
        Ok(tag) => tag,
        Err(_) => {
            buffer.zeroize();
            return Err(CryptoError::Encryption("AES-GCM seal failed".to_string()));
        }
    };

    Ok(EncryptedEnvelope {
        ciphertext: BASE64.encode(&buffer),
        iv: BASE64.encode(iv),
        auth_tag: BASE64.encode(tag.as_slice()),
        algorithm: Algorithm::CURRENT.as_str().to_string(),
    })
}

fn open(envelope: &EncryptedEnvelope, key: &VaultKey, aad: &[u8]) -> CryptoResult<String> {
    let parts = envelope.decode()?;
    let cipher = match parts.algorithm {
        Algorithm::Aes256Gcm => Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| CryptoError::Decryption(e.to_string()))?,
    };

    let mut buffer = parts.ciphertext;
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&parts.iv),
            aad,
            &mut buffer,
            Tag::from_slice(&parts.tag),
        )
        .map_err(|_| {
            CryptoError::Decryption("authentication failed (wrong key or tampered data)".to_string())
        })?;

    String::from_utf8(buffer).map_err(|e| {
        e.into_bytes().zeroize();
        CryptoError::Decryption("plaintext is not valid UTF-8".to_string())
    })
}
