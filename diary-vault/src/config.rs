//! Vault configuration.

use diary_crypto::{KdfParams, MIN_VALID_SCORE};
use serde::{Deserialize, Serialize};

/// Settings applied by a [`VaultManager`](crate::VaultManager).
///
/// KDF parameters only govern vaults created (or re-keyed) afterwards; each
/// vault keeps the iteration count it was set up with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Key derivation parameters for new vaults and password changes.
    pub kdf: KdfParams,

    /// Minimum strength score a vault password must reach.
    pub min_strength_score: u8,

    /// Shortest word indexed for keyword search.
    pub search_min_word_len: usize,

    /// Scrub PII from exported entries.
    pub export_redaction: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            min_strength_score: MIN_VALID_SCORE,
            search_min_word_len: diary_crypto::search::DEFAULT_MIN_WORD_LEN,
            export_redaction: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.kdf.iterations, diary_crypto::DEFAULT_PBKDF2_ITERATIONS);
        assert_eq!(config.min_strength_score, 6);
        assert_eq!(config.search_min_word_len, 2);
        assert!(config.export_redaction);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: VaultConfig = serde_json::from_str(r#"{"export_redaction":false}"#).unwrap();
        assert!(!config.export_redaction);
        assert_eq!(config.min_strength_score, 6);
    }
}
